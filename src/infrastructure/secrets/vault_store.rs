use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::{DomainError, SecretStore};

const BACKEND: &str = "vault";

/// Field of the KV v2 secret document holding the secret value
pub const VALUE_FIELD: &str = "value";

/// Vault client configuration
#[derive(Clone)]
pub struct VaultConfig {
    pub address: String,
    pub token: String,
    pub mount_path: String,
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            mount_path: "secret".to_string(),
        }
    }

    pub fn with_mount_path(mut self, mount_path: impl Into<String>) -> Self {
        self.mount_path = mount_path.into();
        self
    }
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &"[REDACTED]")
            .field("mount_path", &self.mount_path)
            .finish()
    }
}

/// Trait for Vault KV v2 client operations (for mocking)
#[async_trait]
pub trait VaultClientTrait: Send + Sync + std::fmt::Debug {
    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, DomainError>;

    async fn write_secret(
        &self,
        path: &str,
        data: HashMap<String, String>,
    ) -> Result<(), DomainError>;
}

/// Real Vault HTTP client
#[derive(Debug)]
pub struct HttpVaultClient {
    config: VaultConfig,
    http_client: reqwest::Client,
}

impl HttpVaultClient {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// `{address}/v1/{mount}/data/{name}` with `name` encoded as a single path segment
    fn data_url(&self, name: &str) -> Result<reqwest::Url, DomainError> {
        let mut url = reqwest::Url::parse(&self.config.address).map_err(|e| {
            DomainError::configuration(format!(
                "Invalid Vault address '{}': {}",
                self.config.address, e
            ))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                DomainError::configuration(format!(
                    "Vault address '{}' cannot hold a path",
                    self.config.address
                ))
            })?
            .pop_if_empty()
            .push("v1")
            .extend(self.config.mount_path.split('/').filter(|s| !s.is_empty()))
            .push("data")
            .push(name);

        Ok(url)
    }
}

#[derive(Deserialize)]
struct VaultResponse {
    data: VaultData,
}

#[derive(Deserialize)]
struct VaultData {
    data: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl VaultClientTrait for HttpVaultClient {
    async fn read_secret(&self, path: &str) -> Result<HashMap<String, String>, DomainError> {
        let response = self
            .http_client
            .get(self.data_url(path)?)
            .header("X-Vault-Token", &self.config.token)
            .send()
            .await
            .map_err(|e| DomainError::secret_store(BACKEND, format!("Vault request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DomainError::secret_not_found(path));
        }

        if !response.status().is_success() {
            return Err(DomainError::secret_store(
                BACKEND,
                format!("Vault returned error status: {}", response.status()),
            ));
        }

        let vault_response: VaultResponse = response.json().await.map_err(|e| {
            DomainError::secret_store(BACKEND, format!("Failed to parse Vault response: {}", e))
        })?;

        let data = vault_response
            .data
            .data
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect();

        Ok(data)
    }

    async fn write_secret(
        &self,
        path: &str,
        data: HashMap<String, String>,
    ) -> Result<(), DomainError> {
        let response = self
            .http_client
            .post(self.data_url(path)?)
            .header("X-Vault-Token", &self.config.token)
            .json(&serde_json::json!({ "data": data }))
            .send()
            .await
            .map_err(|e| DomainError::secret_store(BACKEND, format!("Vault request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DomainError::secret_store(
                BACKEND,
                format!("Vault returned error status: {}", response.status()),
            ));
        }

        Ok(())
    }
}

/// Secret store backed by HashiCorp Vault KV v2.
///
/// Each secret is a document whose `value` field holds the secret.
#[derive(Debug)]
pub struct VaultSecretStore<C: VaultClientTrait> {
    client: C,
}

impl VaultSecretStore<HttpVaultClient> {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            client: HttpVaultClient::new(config),
        }
    }
}

impl<C: VaultClientTrait> VaultSecretStore<C> {
    pub fn with_client(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: VaultClientTrait> SecretStore for VaultSecretStore<C> {
    async fn read_secret(&self, name: &str) -> Result<String, DomainError> {
        let mut data = self.client.read_secret(name).await?;

        data.remove(VALUE_FIELD).ok_or_else(|| {
            DomainError::secret_store(
                BACKEND,
                format!("Field '{}' not found in Vault secret '{}'", VALUE_FIELD, name),
            )
        })
    }

    async fn write_secret(&self, name: &str, value: &str) -> Result<(), DomainError> {
        let data = HashMap::from([(VALUE_FIELD.to_string(), value.to_string())]);
        self.client.write_secret(name, data).await
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
