//! Secret store backends

mod aws_secrets_store;
mod factory;
mod in_memory;
mod vault_store;

pub use aws_secrets_store::{AwsSecretsStore, RealSecretsManagerClient, SecretsManagerClientTrait};
pub use factory::{SecretStoreConfig, SecretStoreFactory};
pub use in_memory::InMemorySecretStore;
pub use vault_store::{HttpVaultClient, VaultClientTrait, VaultConfig, VaultSecretStore};
