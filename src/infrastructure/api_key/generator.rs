//! API key generation
//!
//! Plaintext keys are version-4 UUIDs; records store their SHA-256 hex digest.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Freshly generated key material
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// The plaintext key (only handed out at creation or rotation)
    pub key: String,
    /// SHA-256 hex digest for the record store
    pub hash: String,
}

/// Generate a new random key and its hash
pub fn generate_api_key() -> GeneratedApiKey {
    let key = Uuid::new_v4().to_string();
    let hash = hash_api_key(&key);

    GeneratedApiKey { key, hash }
}

/// Lowercase hex SHA-256 of the key's UTF-8 bytes (64 characters)
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
