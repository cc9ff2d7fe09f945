use serde::Deserialize;
use std::sync::Arc;

use super::{AwsSecretsStore, InMemorySecretStore, VaultConfig, VaultSecretStore};
use crate::domain::{DomainError, SecretStore};

/// Secret backend configuration
#[derive(Clone, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretStoreConfig {
    #[default]
    Memory,
    AwsSecrets {
        region: Option<String>,
        /// Prepended to every secret name
        prefix: Option<String>,
    },
    Vault {
        address: String,
        token: String,
        #[serde(default = "default_mount_path")]
        mount_path: String,
    },
}

fn default_mount_path() -> String {
    "secret".to_string()
}

impl std::fmt::Debug for SecretStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::AwsSecrets { region, prefix } => f
                .debug_struct("AwsSecrets")
                .field("region", region)
                .field("prefix", prefix)
                .finish(),
            Self::Vault {
                address,
                mount_path,
                ..
            } => f
                .debug_struct("Vault")
                .field("address", address)
                .field("token", &"[REDACTED]")
                .field("mount_path", mount_path)
                .finish(),
        }
    }
}

/// Factory for creating secret stores
#[derive(Debug)]
pub struct SecretStoreFactory;

impl SecretStoreFactory {
    /// Create a secret store from configuration
    pub async fn create(config: &SecretStoreConfig) -> Result<Arc<dyn SecretStore>, DomainError> {
        match config {
            SecretStoreConfig::Memory => Ok(Arc::new(InMemorySecretStore::new())),

            SecretStoreConfig::AwsSecrets { region, prefix } => {
                let mut store = AwsSecretsStore::new(region.clone()).await;

                if let Some(prefix) = prefix {
                    store = store.with_prefix(prefix);
                }

                Ok(Arc::new(store))
            }

            SecretStoreConfig::Vault {
                address,
                token,
                mount_path,
            } => {
                if address.is_empty() {
                    return Err(DomainError::configuration("Vault address is required"));
                }

                let vault_config = VaultConfig::new(address, token).with_mount_path(mount_path);
                Ok(Arc::new(VaultSecretStore::new(vault_config)))
            }
        }
    }
}
