//! PostgreSQL tenant API key repository with connection pooling

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::{DomainError, InsertOutcome, TenantApiKey, TenantApiKeyRepository};

pub const DEFAULT_TABLE_NAME: &str = "tenant_api_keys";

const COLUMNS: &str = "tenant_id, reference_id, key_hash, is_system, system_description, \
                       created_by, role, created_at, updated_at";

/// PostgreSQL connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
    /// Table holding the key records
    pub table_name: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/tenant_api_keys".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_idle_timeout(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = secs;
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Open a connection pool for this configuration
    pub async fn connect(&self) -> Result<PgPool, DomainError> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .connect(&self.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))
    }
}

type RecordKey = (String, String);

fn record_key(tenant_id: &str, reference_id: &str) -> RecordKey {
    (tenant_id.to_string(), reference_id.to_string())
}

fn savepoint_name(id: u64) -> String {
    format!("tenant_api_key_{}", id)
}

/// Open transaction plus the savepoint taken before the latest write of each pair
struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    savepoints: HashMap<RecordKey, u64>,
    next_savepoint: u64,
}

impl UnitOfWork {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx,
            savepoints: HashMap::new(),
            next_savepoint: 0,
        }
    }

    async fn savepoint(&mut self, key: RecordKey) -> Result<u64, DomainError> {
        let id = self.next_savepoint;
        self.next_savepoint += 1;

        sqlx::query(&format!("SAVEPOINT {}", savepoint_name(id)))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to create savepoint: {}", e)))?;

        self.savepoints.insert(key, id);
        Ok(id)
    }

    /// Undo everything written since savepoint `id`
    async fn rollback_to(&mut self, id: u64) -> Result<(), DomainError> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(id)))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!("Failed to roll back to savepoint: {}", e))
            })?;

        self.savepoints.retain(|_, savepoint| *savepoint < id);
        Ok(())
    }

    /// Roll back a failed statement so the transaction stays usable
    async fn recover(&mut self, id: u64) {
        if let Err(e) = self.rollback_to(id).await {
            warn!(error = %e, "Failed to recover transaction after statement error");
        }
    }
}

/// Unit of work over the key record table.
///
/// The first statement opens a transaction that stays open until `commit` or
/// `rollback`. Dropping the repository with an open transaction rolls it back.
/// Each write is preceded by a savepoint so a single pair's write can be discarded.
pub struct PostgresTenantApiKeyRepository {
    pool: PgPool,
    table_name: String,
    work: Mutex<Option<UnitOfWork>>,
}

impl Debug for PostgresTenantApiKeyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTenantApiKeyRepository")
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl PostgresTenantApiKeyRepository {
    pub fn new(pool: PgPool, table_name: impl Into<String>) -> Self {
        Self {
            pool,
            table_name: table_name.into(),
            work: Mutex::new(None),
        }
    }

    /// Connect, make sure the table exists and open a repository over it
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = config.connect().await?;
        let repository = Self::new(pool, &config.table_name);
        repository.ensure_table().await?;
        Ok(repository)
    }

    /// New unit of work sharing this repository's pool
    pub fn session(&self) -> Self {
        Self::new(self.pool.clone(), &self.table_name)
    }

    /// Ensures the key record table exists
    pub async fn ensure_table(&self) -> Result<(), DomainError> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                tenant_id VARCHAR(255) NOT NULL,
                reference_id VARCHAR(255) NOT NULL,
                key_hash CHAR(64) NOT NULL,
                is_system BOOLEAN NOT NULL DEFAULT FALSE,
                system_description TEXT,
                created_by VARCHAR(255) NOT NULL,
                role VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tenant_id, reference_id)
            )
            "#,
            self.table_name
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    async fn unit_of_work<'a>(
        &self,
        slot: &'a mut Option<UnitOfWork>,
    ) -> Result<&'a mut UnitOfWork, DomainError> {
        if slot.is_none() {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
            *slot = Some(UnitOfWork::new(tx));
        }

        slot.as_mut()
            .ok_or_else(|| DomainError::storage("Transaction not available"))
    }

    async fn select(
        &self,
        conn: &mut PgConnection,
        tenant_id: &str,
        reference_id: &str,
    ) -> Result<Option<TenantApiKey>, DomainError> {
        let query = format!(
            "SELECT {} FROM {} WHERE tenant_id = $1 AND reference_id = $2",
            COLUMNS, self.table_name
        );

        sqlx::query_as::<_, TenantApiKey>(&query)
            .bind(tenant_id)
            .bind(reference_id)
            .fetch_optional(conn)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key record: {}", e)))
    }

    fn insert_query(&self, on_conflict: &str) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) {} RETURNING {}",
            self.table_name, COLUMNS, on_conflict, COLUMNS
        )
    }
}

fn insert_error(e: sqlx::Error, record: &TenantApiKey) -> DomainError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::conflict(format!(
            "API key '{}' already exists for tenant '{}'",
            record.reference_id(),
            record.tenant_id()
        )),
        _ => DomainError::storage(format!("Failed to insert API key record: {}", e)),
    }
}

#[async_trait]
impl TenantApiKeyRepository for PostgresTenantApiKeyRepository {
    async fn find(
        &self,
        tenant_id: &str,
        reference_id: &str,
    ) -> Result<Option<TenantApiKey>, DomainError> {
        let mut slot = self.work.lock().await;
        let work = self.unit_of_work(&mut slot).await?;
        self.select(&mut work.tx, tenant_id, reference_id).await
    }

    async fn insert(&self, record: TenantApiKey) -> Result<TenantApiKey, DomainError> {
        let query = self.insert_query("");

        let mut slot = self.work.lock().await;
        let work = self.unit_of_work(&mut slot).await?;
        let savepoint = work
            .savepoint(record_key(record.tenant_id(), record.reference_id()))
            .await?;

        let result = sqlx::query_as::<_, TenantApiKey>(&query)
            .bind(record.tenant_id())
            .bind(record.reference_id())
            .bind(record.key_hash())
            .bind(record.is_system())
            .bind(record.system_description())
            .bind(record.created_by())
            .bind(record.role())
            .bind(record.created_at())
            .bind(record.updated_at())
            .fetch_one(&mut *work.tx)
            .await;

        match result {
            Ok(inserted) => Ok(inserted),
            Err(e) => {
                work.recover(savepoint).await;
                Err(insert_error(e, &record))
            }
        }
    }

    async fn insert_or_fetch(&self, record: TenantApiKey) -> Result<InsertOutcome, DomainError> {
        let query = self.insert_query("ON CONFLICT (tenant_id, reference_id) DO NOTHING");
        let key = record_key(record.tenant_id(), record.reference_id());

        let mut slot = self.work.lock().await;
        let work = self.unit_of_work(&mut slot).await?;
        let savepoint = work.savepoint(key.clone()).await?;

        // blocks on a concurrent uncommitted insert of the same pair until it resolves
        let result = sqlx::query_as::<_, TenantApiKey>(&query)
            .bind(record.tenant_id())
            .bind(record.reference_id())
            .bind(record.key_hash())
            .bind(record.is_system())
            .bind(record.system_description())
            .bind(record.created_by())
            .bind(record.role())
            .bind(record.created_at())
            .bind(record.updated_at())
            .fetch_optional(&mut *work.tx)
            .await;

        let inserted = match result {
            Ok(inserted) => inserted,
            Err(e) => {
                work.recover(savepoint).await;
                return Err(insert_error(e, &record));
            }
        };

        if let Some(inserted) = inserted {
            return Ok(InsertOutcome::Inserted(inserted));
        }

        // nothing was written, so there is nothing to discard for this pair
        work.savepoints.remove(&key);

        self.select(&mut work.tx, record.tenant_id(), record.reference_id())
            .await?
            .map(InsertOutcome::Existing)
            .ok_or_else(|| {
                DomainError::storage(format!(
                    "API key '{}' for tenant '{}' conflicted but could not be read back",
                    record.reference_id(),
                    record.tenant_id()
                ))
            })
    }

    async fn update_key_hash(
        &self,
        tenant_id: &str,
        reference_id: &str,
        key_hash: &str,
    ) -> Result<TenantApiKey, DomainError> {
        let query = format!(
            "UPDATE {} SET key_hash = $3, updated_at = NOW() \
             WHERE tenant_id = $1 AND reference_id = $2 RETURNING {}",
            self.table_name, COLUMNS
        );

        let mut slot = self.work.lock().await;
        let work = self.unit_of_work(&mut slot).await?;
        let savepoint = work.savepoint(record_key(tenant_id, reference_id)).await?;

        let result = sqlx::query_as::<_, TenantApiKey>(&query)
            .bind(tenant_id)
            .bind(reference_id)
            .bind(key_hash)
            .fetch_optional(&mut *work.tx)
            .await;

        match result {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => {
                work.recover(savepoint).await;
                Err(DomainError::record_not_found(tenant_id, reference_id))
            }
            Err(e) => {
                work.recover(savepoint).await;
                Err(DomainError::storage(format!("Failed to update API key record: {}", e)))
            }
        }
    }

    async fn discard(&self, tenant_id: &str, reference_id: &str) -> Result<(), DomainError> {
        let mut slot = self.work.lock().await;

        let Some(work) = slot.as_mut() else {
            return Ok(());
        };

        match work.savepoints.get(&record_key(tenant_id, reference_id)).copied() {
            Some(savepoint) => work.rollback_to(savepoint).await,
            None => Ok(()),
        }
    }

    async fn commit(&self) -> Result<(), DomainError> {
        let mut slot = self.work.lock().await;

        match slot.take() {
            Some(work) => work
                .tx
                .commit()
                .await
                .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e))),
            None => Ok(()),
        }
    }

    async fn rollback(&self) -> Result<(), DomainError> {
        let mut slot = self.work.lock().await;

        match slot.take() {
            Some(work) => work.tx.rollback().await.map_err(|e| {
                DomainError::storage(format!("Failed to roll back transaction: {}", e))
            }),
            None => Ok(()),
        }
    }
}
