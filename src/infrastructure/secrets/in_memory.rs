use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{DomainError, SecretStore};

/// Thread-safe in-memory secret store
///
/// Useful for testing and development. Secrets are lost when the process terminates.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(mut secrets) = self.secrets.write() {
            secrets.insert(name.into(), value.into());
        }
        self
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.secrets.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn read_secret(&self, name: &str) -> Result<String, DomainError> {
        let secrets = self.secrets.read().map_err(|e| {
            DomainError::secret_store("memory", format!("Failed to acquire read lock: {}", e))
        })?;

        secrets
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::secret_not_found(name))
    }

    async fn write_secret(&self, name: &str, value: &str) -> Result<(), DomainError> {
        let mut secrets = self.secrets.write().map_err(|e| {
            DomainError::secret_store("memory", format!("Failed to acquire write lock: {}", e))
        })?;

        secrets.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
