use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;

use crate::domain::{DomainError, SecretStore};

const BACKEND: &str = "aws_secrets";

/// Trait for AWS Secrets Manager client operations (for mocking)
#[async_trait]
pub trait SecretsManagerClientTrait: Send + Sync + std::fmt::Debug {
    async fn get_secret_value(&self, secret_name: &str) -> Result<String, DomainError>;

    /// Store a new version of an existing secret, `SecretNotFound` if it does not exist
    async fn put_secret_value(&self, secret_name: &str, value: &str) -> Result<(), DomainError>;

    async fn create_secret(&self, secret_name: &str, value: &str) -> Result<(), DomainError>;
}

/// Real AWS Secrets Manager client wrapper
#[derive(Debug)]
pub struct RealSecretsManagerClient {
    client: SecretsManagerClient,
}

impl RealSecretsManagerClient {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretsManagerClientTrait for RealSecretsManagerClient {
    async fn get_secret_value(&self, secret_name: &str) -> Result<String, DomainError> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());

                if not_found {
                    DomainError::secret_not_found(secret_name)
                } else {
                    DomainError::secret_store(BACKEND, format!("GetSecretValue failed: {}", e))
                }
            })?;

        response
            .secret_string()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                DomainError::secret_store(BACKEND, "Secret does not contain a string value")
            })
    }

    async fn put_secret_value(&self, secret_name: &str, value: &str) -> Result<(), DomainError> {
        self.client
            .put_secret_value()
            .secret_id(secret_name)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception());

                if not_found {
                    DomainError::secret_not_found(secret_name)
                } else {
                    DomainError::secret_store(BACKEND, format!("PutSecretValue failed: {}", e))
                }
            })?;

        Ok(())
    }

    async fn create_secret(&self, secret_name: &str, value: &str) -> Result<(), DomainError> {
        self.client
            .create_secret()
            .name(secret_name)
            .secret_string(value)
            .send()
            .await
            .map_err(|e| DomainError::secret_store(BACKEND, format!("CreateSecret failed: {}", e)))?;

        Ok(())
    }
}

/// Secret store backed by AWS Secrets Manager.
///
/// An optional prefix is prepended to every secret name, e.g. `prod/` stores
/// `t1-webhook` as `prod/t1-webhook`.
#[derive(Debug)]
pub struct AwsSecretsStore<C: SecretsManagerClientTrait> {
    client: C,
    prefix: Option<String>,
}

impl AwsSecretsStore<RealSecretsManagerClient> {
    /// Build a store from the default AWS credential chain, optionally pinned to a region
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }

        let config = loader.load().await;

        Self::with_client(RealSecretsManagerClient::new(SecretsManagerClient::new(&config)))
    }
}

impl<C: SecretsManagerClientTrait> AwsSecretsStore<C> {
    pub fn with_client(client: C) -> Self {
        Self {
            client,
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    fn secret_id(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }
}

#[async_trait]
impl<C: SecretsManagerClientTrait> SecretStore for AwsSecretsStore<C> {
    async fn read_secret(&self, name: &str) -> Result<String, DomainError> {
        self.client.get_secret_value(&self.secret_id(name)).await
    }

    async fn write_secret(&self, name: &str, value: &str) -> Result<(), DomainError> {
        let secret_id = self.secret_id(name);

        match self.client.put_secret_value(&secret_id, value).await {
            Err(DomainError::SecretNotFound { .. }) => {
                tracing::debug!(secret_name = %secret_id, "Secret does not exist yet, creating it");
                self.client.create_secret(&secret_id, value).await
            }
            other => other,
        }
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
