//! Tenant API keys
//!
//! Issues, rotates and fetches tenant-scoped API keys. Each key is split across two
//! stores:
//! - the record store holds the SHA-256 hash with role and ownership metadata
//! - the secret store holds the plaintext under `{tenant_id}-{reference_id}`
//!
//! Secret backends: in-memory, AWS Secrets Manager and HashiCorp Vault, with an
//! optional read cache. Record backends: in-memory and PostgreSQL.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{DomainError, Role, RotatedApiKey, TenantApiKey};
pub use infrastructure::api_key::{ApiKeyManager, NewApiKey};
