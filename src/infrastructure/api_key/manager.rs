//! Tenant API key manager
//!
//! Orchestrates the key record store and the secret store so that the record holds
//! the key hash and the secret store holds the plaintext under
//! `{tenant_id}-{reference_id}`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::domain::api_key::{validate_reference_id, validate_tenant_id};
use crate::domain::{
    secret_name, DomainError, InsertOutcome, ReferenceRoleResolver, Role, RoleResolver,
    RotatedApiKey, SecretStore, TenantApiKey, TenantApiKeyRepository,
};

use super::generator::generate_api_key;

/// Parameters for issuing a new API key
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub tenant_id: String,
    pub reference_id: String,
    pub created_by: String,
    pub role: Role,
    pub is_system: bool,
    pub description: Option<String>,
    /// Commit the record store unit of work before returning
    pub commit: bool,
}

impl NewApiKey {
    pub fn new(
        tenant_id: impl Into<String>,
        reference_id: impl Into<String>,
        created_by: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            reference_id: reference_id.into(),
            created_by: created_by.into(),
            role,
            is_system: false,
            description: None,
            commit: true,
        }
    }

    pub fn with_system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Leave the staged record for the caller to commit
    pub fn without_commit(mut self) -> Self {
        self.commit = false;
        self
    }
}

/// Issues, rotates and fetches tenant API keys
#[derive(Debug, Clone)]
pub struct ApiKeyManager {
    secrets: Arc<dyn SecretStore>,
    repository: Arc<dyn TenantApiKeyRepository>,
    role_resolver: Arc<dyn RoleResolver>,
}

impl ApiKeyManager {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        repository: Arc<dyn TenantApiKeyRepository>,
    ) -> Self {
        Self {
            secrets,
            repository,
            role_resolver: Arc::new(ReferenceRoleResolver::default()),
        }
    }

    /// Replace the resolver used for keys created on demand
    pub fn with_role_resolver(mut self, role_resolver: Arc<dyn RoleResolver>) -> Self {
        self.role_resolver = role_resolver;
        self
    }

    pub fn repository(&self) -> &Arc<dyn TenantApiKeyRepository> {
        &self.repository
    }

    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Issue a new key and return its plaintext.
    ///
    /// The record is staged first, so a duplicate (tenant, reference id) fails with
    /// `Conflict` before the secret store is touched. The secret is then written
    /// unconditionally.
    pub async fn create_api_key(&self, request: NewApiKey) -> Result<String, DomainError> {
        validate_tenant_id(&request.tenant_id)?;
        validate_reference_id(&request.reference_id)?;

        let tenant_id = request.tenant_id.as_str();
        let reference_id = request.reference_id.as_str();
        info!(tenant_id, reference_id, "Creating API key");

        let generated = generate_api_key();
        let record = TenantApiKey::new(
            tenant_id,
            reference_id,
            &generated.hash,
            &request.created_by,
            request.role.name(),
        )
        .with_system(request.is_system)
        .with_description(request.description.clone());

        self.repository.insert(record).await?;
        self.store_new_secret(tenant_id, reference_id, &generated.key, request.commit)
            .await?;

        info!(tenant_id, reference_id, "Created API key");
        Ok(generated.key)
    }

    /// Rotate the secret of an existing key.
    ///
    /// Returns `None` without touching either store when no record exists. Only the
    /// record's hash changes; role, system flag and description are left as stored.
    pub async fn update_api_key(
        &self,
        tenant_id: &str,
        reference_id: &str,
        created_by: &str,
        description: Option<&str>,
    ) -> Result<Option<RotatedApiKey>, DomainError> {
        validate_tenant_id(tenant_id)?;
        validate_reference_id(reference_id)?;

        info!(
            tenant_id,
            reference_id,
            updated_by = created_by,
            description = description.unwrap_or_default(),
            "Updating API key"
        );

        let Some(record) = self.repository.find(tenant_id, reference_id).await? else {
            debug!(tenant_id, reference_id, "No API key to update");
            return Ok(None);
        };

        let name = record.secret_name();
        let old_secret = self.secrets.read_secret(&name).await?;

        let generated = generate_api_key();
        self.repository
            .update_key_hash(tenant_id, reference_id, &generated.hash)
            .await?;

        if let Err(e) = self.secrets.write_secret(&name, &generated.key).await {
            self.discard_staged(tenant_id, reference_id).await;
            return Err(e);
        }

        if let Err(e) = self.repository.commit().await {
            // the secret store is now ahead of the record; put the old value back
            error!(
                tenant_id,
                reference_id,
                error = %e,
                "Commit failed after secret rotation, restoring previous secret"
            );

            if let Err(restore_err) = self.secrets.write_secret(&name, &old_secret).await {
                error!(
                    tenant_id,
                    reference_id,
                    error = %restore_err,
                    "Failed to restore previous secret; secret store and record are out of sync"
                );
            }

            return Err(e);
        }

        info!(tenant_id, reference_id, "Updated API key secret");

        Ok(Some(RotatedApiKey {
            old_secret,
            new_key: generated.key,
        }))
    }

    /// Return the current plaintext for a key, creating a system key if none exists.
    ///
    /// An existing key's plaintext is read from the secret store as-is; it is not
    /// checked against the recorded hash.
    pub async fn get_or_create_api_key(
        &self,
        tenant_id: &str,
        created_by: &str,
        reference_id: &str,
        description: Option<&str>,
    ) -> Result<String, DomainError> {
        validate_tenant_id(tenant_id)?;
        validate_reference_id(reference_id)?;

        info!(tenant_id, reference_id, "Getting or creating API key");

        let name = secret_name(tenant_id, reference_id);

        if self.repository.find(tenant_id, reference_id).await?.is_some() {
            let key = self.secrets.read_secret(&name).await?;
            info!(tenant_id, reference_id, "Got API key");
            return Ok(key);
        }

        let role = self.role_resolver.resolve(reference_id);
        let generated = generate_api_key();
        let record = TenantApiKey::new(
            tenant_id,
            reference_id,
            &generated.hash,
            created_by,
            role.name(),
        )
        .with_system(true)
        .with_description(description.map(str::to_string));

        let key = match self.repository.insert_or_fetch(record).await? {
            InsertOutcome::Inserted(_) => {
                info!(tenant_id, reference_id, role = %role, "Creating API key");
                self.store_new_secret(tenant_id, reference_id, &generated.key, true)
                    .await?;
                generated.key
            }
            InsertOutcome::Existing(_) => {
                debug!(
                    tenant_id,
                    reference_id, "API key was created concurrently, reading stored secret"
                );
                self.secrets.read_secret(&name).await?
            }
        };

        info!(tenant_id, reference_id, "Got API key");
        Ok(key)
    }

    /// Write the plaintext of a freshly staged record and optionally commit.
    ///
    /// A failed secret write discards the staged record so no hash is persisted
    /// without its secret. Other writes staged in the same unit of work are kept.
    async fn store_new_secret(
        &self,
        tenant_id: &str,
        reference_id: &str,
        key: &str,
        commit: bool,
    ) -> Result<(), DomainError> {
        let name = secret_name(tenant_id, reference_id);

        if let Err(e) = self.secrets.write_secret(&name, key).await {
            self.discard_staged(tenant_id, reference_id).await;
            return Err(e);
        }

        if commit {
            self.repository.commit().await?;
        }

        Ok(())
    }

    async fn discard_staged(&self, tenant_id: &str, reference_id: &str) {
        if let Err(e) = self.repository.discard(tenant_id, reference_id).await {
            warn!(
                tenant_id,
                reference_id,
                error = %e,
                "Failed to discard staged API key record"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secrets::MockSecretStore;
    use crate::infrastructure::api_key::hash_api_key;
    use crate::infrastructure::secrets::InMemorySecretStore;
    use crate::infrastructure::storage::InMemoryTenantApiKeyRepository;
    use async_trait::async_trait;

    struct Fixture {
        secrets: Arc<InMemorySecretStore>,
        repo: Arc<InMemoryTenantApiKeyRepository>,
        manager: ApiKeyManager,
    }

    fn fixture() -> Fixture {
        let secrets = Arc::new(InMemorySecretStore::new());
        let repo = Arc::new(InMemoryTenantApiKeyRepository::new());
        let manager = ApiKeyManager::new(secrets.clone(), repo.clone());

        Fixture {
            secrets,
            repo,
            manager,
        }
    }

    fn failing_writes() -> MockSecretStore {
        let mut secrets = MockSecretStore::new();
        secrets
            .expect_write_secret()
            .returning(|_, _| Err(DomainError::secret_store("mock", "unavailable")));
        secrets.expect_backend_name().return_const("mock");
        secrets
    }

    /// Delegates to an in-memory repository but refuses to commit
    #[derive(Debug)]
    struct FailingCommitRepository(InMemoryTenantApiKeyRepository);

    #[async_trait]
    impl TenantApiKeyRepository for FailingCommitRepository {
        async fn find(
            &self,
            tenant_id: &str,
            reference_id: &str,
        ) -> Result<Option<TenantApiKey>, DomainError> {
            self.0.find(tenant_id, reference_id).await
        }

        async fn insert(&self, record: TenantApiKey) -> Result<TenantApiKey, DomainError> {
            self.0.insert(record).await
        }

        async fn insert_or_fetch(
            &self,
            record: TenantApiKey,
        ) -> Result<InsertOutcome, DomainError> {
            self.0.insert_or_fetch(record).await
        }

        async fn update_key_hash(
            &self,
            tenant_id: &str,
            reference_id: &str,
            key_hash: &str,
        ) -> Result<TenantApiKey, DomainError> {
            self.0.update_key_hash(tenant_id, reference_id, key_hash).await
        }

        async fn discard(&self, tenant_id: &str, reference_id: &str) -> Result<(), DomainError> {
            self.0.discard(tenant_id, reference_id).await
        }

        async fn commit(&self) -> Result<(), DomainError> {
            Err(DomainError::storage("database went away"))
        }

        async fn rollback(&self) -> Result<(), DomainError> {
            self.0.rollback().await
        }
    }

    /// Yields before every write so concurrent callers interleave
    #[derive(Debug)]
    struct YieldingSecretStore(Arc<InMemorySecretStore>);

    #[async_trait]
    impl SecretStore for YieldingSecretStore {
        async fn read_secret(&self, name: &str) -> Result<String, DomainError> {
            self.0.read_secret(name).await
        }

        async fn write_secret(&self, name: &str, value: &str) -> Result<(), DomainError> {
            tokio::task::yield_now().await;
            self.0.write_secret(name, value).await
        }

        fn backend_name(&self) -> &'static str {
            "yielding"
        }
    }

    #[tokio::test]
    async fn test_create_then_get_or_create_returns_same_key() {
        let f = fixture();

        let created = f
            .manager
            .create_api_key(NewApiKey::new("t1", "ci", "u1", Role::admin()))
            .await
            .unwrap();

        let fetched = f
            .manager
            .get_or_create_api_key("t1", "u1", "ci", None)
            .await
            .unwrap();

        assert_eq!(created, fetched);
        assert_eq!(f.repo.committed_count(), 1);
    }

    #[tokio::test]
    async fn test_create_stores_hash_and_secret() {
        let f = fixture();

        let key = f
            .manager
            .create_api_key(
                NewApiKey::new("t1", "ci", "u1", Role::new("noc"))
                    .with_system(true)
                    .with_description("ci runner"),
            )
            .await
            .unwrap();

        let record = f.repo.session().find("t1", "ci").await.unwrap().unwrap();
        assert_eq!(record.key_hash(), hash_api_key(&key));
        assert_eq!(record.role(), "noc");
        assert!(record.is_system());
        assert_eq!(record.system_description(), Some("ci runner"));
        assert_eq!(record.created_by(), "u1");

        assert_eq!(f.secrets.read_secret("t1-ci").await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_create_without_commit_leaves_record_staged() {
        let f = fixture();
        let reader = f.repo.session();

        f.manager
            .create_api_key(NewApiKey::new("t1", "ci", "u1", Role::admin()).without_commit())
            .await
            .unwrap();

        assert!(reader.find("t1", "ci").await.unwrap().is_none());
        assert_eq!(f.repo.pending_count(), 1);

        f.repo.commit().await.unwrap();
        assert!(reader.find("t1", "ci").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts_without_touching_secret() {
        let f = fixture();

        let first = f
            .manager
            .create_api_key(NewApiKey::new("t1", "ci", "u1", Role::admin()))
            .await
            .unwrap();

        let result = f
            .manager
            .create_api_key(NewApiKey::new("t1", "ci", "u2", Role::admin()))
            .await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert_eq!(f.secrets.read_secret("t1-ci").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_create_secret_failure_discards_record() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::new());
        let manager = ApiKeyManager::new(Arc::new(failing_writes()), repo.clone());

        let result = manager
            .create_api_key(NewApiKey::new("t1", "ci", "u1", Role::admin()))
            .await;

        assert!(matches!(result, Err(DomainError::SecretStore { .. })));
        assert_eq!(repo.pending_count(), 0);
        assert_eq!(repo.committed_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_identifiers() {
        let f = fixture();

        let result = f
            .manager
            .create_api_key(NewApiKey::new("", "ci", "u1", Role::admin()))
            .await;

        assert!(matches!(result, Err(DomainError::Validation { .. })));
        assert!(f.secrets.is_empty());
        assert_eq!(f.repo.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let f = fixture();

        let first = f
            .manager
            .get_or_create_api_key("t1", "system", "backup", Some("nightly backups"))
            .await
            .unwrap();
        let second = f
            .manager
            .get_or_create_api_key("t1", "system", "backup", None)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.repo.committed_count(), 1);

        let record = f.repo.find("t1", "backup").await.unwrap().unwrap();
        assert!(record.is_system());
        assert_eq!(record.system_description(), Some("nightly backups"));
        assert_eq!(record.key_hash(), hash_api_key(&first));
    }

    #[tokio::test]
    async fn test_get_or_create_default_roles() {
        let f = fixture();

        f.manager
            .get_or_create_api_key("someTenant", "system", "webhook", None)
            .await
            .unwrap();
        f.manager
            .get_or_create_api_key("someTenant", "system", "anything-else", None)
            .await
            .unwrap();

        let webhook = f.repo.find("someTenant", "webhook").await.unwrap().unwrap();
        let other = f
            .repo
            .find("someTenant", "anything-else")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(webhook.role(), "webhook");
        assert_eq!(other.role(), "admin");
    }

    #[tokio::test]
    async fn test_get_or_create_custom_role_resolver() {
        let f = fixture();
        let resolver = ReferenceRoleResolver::new(Role::new("noc"))
            .with_override("webhook", Role::webhook());
        let manager = f.manager.clone().with_role_resolver(Arc::new(resolver));

        manager
            .get_or_create_api_key("t1", "system", "grafana", None)
            .await
            .unwrap();

        let record = f.repo.find("t1", "grafana").await.unwrap().unwrap();
        assert_eq!(record.role(), "noc");
    }

    #[tokio::test]
    async fn test_get_or_create_returns_secret_store_value() {
        let f = fixture();

        f.manager
            .get_or_create_api_key("t1", "system", "webhook", None)
            .await
            .unwrap();

        // rotated out of band; the secret store wins
        f.secrets
            .write_secret("t1-webhook", "externally-rotated")
            .await
            .unwrap();

        let key = f
            .manager
            .get_or_create_api_key("t1", "system", "webhook", None)
            .await
            .unwrap();
        assert_eq!(key, "externally-rotated");
    }

    #[tokio::test]
    async fn test_get_or_create_missing_secret_propagates() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::with_records(vec![
            TenantApiKey::new("t1", "webhook", "abc", "system", "webhook"),
        ]));
        let manager = ApiKeyManager::new(Arc::new(InMemorySecretStore::new()), repo);

        let result = manager
            .get_or_create_api_key("t1", "system", "webhook", None)
            .await;

        assert!(matches!(result, Err(DomainError::SecretNotFound { name }) if name == "t1-webhook"));
    }

    #[tokio::test]
    async fn test_get_or_create_secret_failure_discards_record() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::new());
        let manager = ApiKeyManager::new(Arc::new(failing_writes()), repo.clone());

        let result = manager
            .get_or_create_api_key("t1", "system", "webhook", None)
            .await;

        assert!(result.is_err());
        assert!(repo.find("t1", "webhook").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_agrees_on_one_key() {
        let secrets = Arc::new(InMemorySecretStore::new());
        let repo = InMemoryTenantApiKeyRepository::new();

        let first = ApiKeyManager::new(
            Arc::new(YieldingSecretStore(secrets.clone())),
            Arc::new(repo.session()),
        );
        let second = ApiKeyManager::new(
            Arc::new(YieldingSecretStore(secrets.clone())),
            Arc::new(repo.session()),
        );

        let (a, b) = tokio::join!(
            first.get_or_create_api_key("t1", "system", "ci", None),
            second.get_or_create_api_key("t1", "system", "ci", None),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a, b);
        assert_eq!(secrets.read_secret("t1-ci").await.unwrap(), a);
        assert_eq!(repo.committed_count(), 1);
        assert_eq!(
            repo.find("t1", "ci").await.unwrap().unwrap().key_hash(),
            hash_api_key(&a)
        );
    }

    #[tokio::test]
    async fn test_secret_failure_keeps_callers_other_staged_writes() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::new());
        let working = ApiKeyManager::new(Arc::new(InMemorySecretStore::new()), repo.clone());
        let failing = ApiKeyManager::new(Arc::new(failing_writes()), repo.clone());

        working
            .create_api_key(NewApiKey::new("t1", "a", "u1", Role::admin()).without_commit())
            .await
            .unwrap();

        let result = failing
            .create_api_key(NewApiKey::new("t1", "b", "u1", Role::admin()).without_commit())
            .await;
        assert!(result.is_err());

        let result = failing.get_or_create_api_key("t1", "system", "c", None).await;
        assert!(result.is_err());

        assert_eq!(repo.pending_count(), 1);
        repo.commit().await.unwrap();

        let reader = repo.session();
        assert!(reader.find("t1", "a").await.unwrap().is_some());
        assert!(reader.find("t1", "b").await.unwrap().is_none());
        assert!(reader.find("t1", "c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_key_returns_none() {
        let f = fixture();

        let result = f
            .manager
            .update_api_key("t1", "ci", "u1", None)
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(f.secrets.is_empty());
        assert_eq!(f.repo.pending_count(), 0);
        assert_eq!(f.repo.committed_count(), 0);
    }

    #[tokio::test]
    async fn test_update_rotates_secret_and_hash() {
        let f = fixture();

        let k1 = f
            .manager
            .create_api_key(
                NewApiKey::new("t1", "deploy-bot", "u1", Role::webhook())
                    .with_system(true)
                    .with_description("deployments"),
            )
            .await
            .unwrap();

        let rotated = f
            .manager
            .update_api_key("t1", "deploy-bot", "u1", Some("ignored"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rotated.old_secret, k1);
        assert_ne!(rotated.new_key, k1);

        let record = f.repo.session().find("t1", "deploy-bot").await.unwrap().unwrap();
        assert_eq!(record.key_hash(), hash_api_key(&rotated.new_key));
        assert_eq!(record.role(), "webhook");
        assert!(record.is_system());
        assert_eq!(record.system_description(), Some("deployments"));

        assert_eq!(
            f.secrets.read_secret("t1-deploy-bot").await.unwrap(),
            rotated.new_key
        );
    }

    #[tokio::test]
    async fn test_update_missing_secret_fails() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::with_records(vec![
            TenantApiKey::new("t1", "ci", "abc", "u1", "admin"),
        ]));
        let manager = ApiKeyManager::new(Arc::new(InMemorySecretStore::new()), repo.clone());

        let result = manager.update_api_key("t1", "ci", "u1", None).await;

        assert!(matches!(result, Err(DomainError::SecretNotFound { .. })));
        assert_eq!(repo.find("t1", "ci").await.unwrap().unwrap().key_hash(), "abc");
    }

    #[tokio::test]
    async fn test_update_secret_failure_keeps_old_hash() {
        let repo = Arc::new(InMemoryTenantApiKeyRepository::with_records(vec![
            TenantApiKey::new("t1", "ci", "abc", "u1", "admin"),
        ]));
        let mut secrets = failing_writes();
        secrets
            .expect_read_secret()
            .returning(|_| Ok("old-key".to_string()));
        let manager = ApiKeyManager::new(Arc::new(secrets), repo.clone());

        let result = manager.update_api_key("t1", "ci", "u1", None).await;

        assert!(matches!(result, Err(DomainError::SecretStore { .. })));
        assert_eq!(repo.pending_count(), 0);
        assert_eq!(repo.find("t1", "ci").await.unwrap().unwrap().key_hash(), "abc");
    }

    #[tokio::test]
    async fn test_update_commit_failure_restores_secret() {
        let secrets = Arc::new(InMemorySecretStore::new().with_secret("t1-ci", "old-key"));
        let repo = Arc::new(FailingCommitRepository(
            InMemoryTenantApiKeyRepository::with_records(vec![TenantApiKey::new(
                "t1",
                "ci",
                hash_api_key("old-key"),
                "u1",
                "admin",
            )]),
        ));
        let manager = ApiKeyManager::new(secrets.clone(), repo);

        let result = manager.update_api_key("t1", "ci", "u1", None).await;

        assert!(matches!(result, Err(DomainError::Storage { .. })));
        assert_eq!(secrets.read_secret("t1-ci").await.unwrap(), "old-key");
    }

    #[tokio::test]
    async fn test_deploy_bot_scenario() {
        let f = fixture();

        let k1 = f
            .manager
            .create_api_key(NewApiKey::new("t1", "deploy-bot", "u1", Role::admin()))
            .await
            .unwrap();
        assert_eq!(
            f.repo.find("t1", "deploy-bot").await.unwrap().unwrap().key_hash(),
            hash_api_key(&k1)
        );

        let rotated = f
            .manager
            .update_api_key("t1", "deploy-bot", "u1", None)
            .await
            .unwrap()
            .unwrap();
        let k2 = rotated.new_key.clone();

        assert_eq!(rotated.old_secret, k1);
        assert_eq!(
            f.repo.find("t1", "deploy-bot").await.unwrap().unwrap().key_hash(),
            hash_api_key(&k2)
        );
        assert_eq!(f.secrets.read_secret("t1-deploy-bot").await.unwrap(), k2);
        assert_eq!(
            f.manager
                .get_or_create_api_key("t1", "u1", "deploy-bot", None)
                .await
                .unwrap(),
            k2
        );
    }
}
