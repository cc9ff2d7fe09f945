//! Record store factory for runtime backend selection

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::{DomainError, TenantApiKeyRepository};

use super::in_memory::InMemoryTenantApiKeyRepository;
use super::postgres::{PostgresConfig, PostgresTenantApiKeyRepository};

/// Supported record store types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordStoreConfig {
    /// In-memory storage configuration
    #[default]
    Memory,
    /// PostgreSQL storage configuration
    Postgres(PostgresConfig),
}

impl RecordStoreConfig {
    /// Creates a PostgreSQL configuration from a URL
    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres(PostgresConfig::new(url))
    }

    /// Returns the record store type
    pub fn store_type(&self) -> RecordStoreType {
        match self {
            Self::Memory => RecordStoreType::InMemory,
            Self::Postgres(_) => RecordStoreType::Postgres,
        }
    }
}

/// Factory for creating key record repositories
#[derive(Debug)]
pub struct RecordStoreFactory;

impl RecordStoreFactory {
    /// Creates a repository based on the configuration
    pub async fn create(
        config: &RecordStoreConfig,
    ) -> Result<Arc<dyn TenantApiKeyRepository>, DomainError> {
        match config {
            RecordStoreConfig::Memory => Ok(Arc::new(InMemoryTenantApiKeyRepository::new())),
            RecordStoreConfig::Postgres(pg_config) => {
                if pg_config.url.is_empty() {
                    return Err(DomainError::configuration("PostgreSQL URL is required"));
                }

                let repository = PostgresTenantApiKeyRepository::connect(pg_config).await?;
                Ok(Arc::new(repository))
            }
        }
    }
}
