//! Tenant API key record and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name under which the plaintext of a key is held in the secret store.
///
/// Other components address secrets by recomputing this, so the format is fixed:
/// `{tenant_id}-{reference_id}`.
pub fn secret_name(tenant_id: &str, reference_id: &str) -> String {
    format!("{}-{}", tenant_id, reference_id)
}

/// Persisted API key record, one per (tenant, reference id).
///
/// Holds the SHA-256 hex digest of the key, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantApiKey {
    tenant_id: String,
    reference_id: String,
    key_hash: String,
    is_system: bool,
    system_description: Option<String>,
    created_by: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantApiKey {
    pub fn new(
        tenant_id: impl Into<String>,
        reference_id: impl Into<String>,
        key_hash: impl Into<String>,
        created_by: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            tenant_id: tenant_id.into(),
            reference_id: reference_id.into(),
            key_hash: key_hash.into(),
            is_system: false,
            system_description: None,
            created_by: created_by.into(),
            role: role.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.system_description = description;
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn key_hash(&self) -> &str {
        &self.key_hash
    }

    pub fn is_system(&self) -> bool {
        self.is_system
    }

    pub fn system_description(&self) -> Option<&str> {
        self.system_description.as_deref()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Secret store name holding this key's plaintext
    pub fn secret_name(&self) -> String {
        secret_name(&self.tenant_id, &self.reference_id)
    }

    /// Replace the stored hash. Nothing else on the record changes.
    pub fn set_key_hash(&mut self, key_hash: impl Into<String>) {
        self.key_hash = key_hash.into();
        self.updated_at = Utc::now();
    }
}

/// Plaintext pair returned by a key rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotatedApiKey {
    /// Secret store value immediately before the rotation
    pub old_secret: String,
    /// Freshly issued plaintext
    pub new_key: String,
}
