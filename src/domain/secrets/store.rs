use async_trait::async_trait;
use std::fmt::Debug;

#[cfg(test)]
use mockall::automock;

use crate::domain::DomainError;

/// Key/value store for secret material (in-memory, AWS Secrets Manager, Vault, etc.)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync + Debug {
    /// Read a secret by name, failing with `SecretNotFound` if it does not exist
    async fn read_secret(&self, name: &str) -> Result<String, DomainError>;

    /// Write a secret, overwriting any previous value
    async fn write_secret(&self, name: &str, value: &str) -> Result<(), DomainError>;

    /// Backend name for logging/debugging
    fn backend_name(&self) -> &'static str;
}
