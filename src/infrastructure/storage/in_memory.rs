//! In-memory tenant API key repository

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{DomainError, InsertOutcome, TenantApiKey, TenantApiKeyRepository};

type RecordKey = (String, String);

fn record_key(tenant_id: &str, reference_id: &str) -> RecordKey {
    (tenant_id.to_string(), reference_id.to_string())
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Insert(TenantApiKey),
    Update(TenantApiKey),
}

impl StagedWrite {
    fn record(&self) -> &TenantApiKey {
        match self {
            Self::Insert(record) | Self::Update(record) => record,
        }
    }

    fn into_record(self) -> TenantApiKey {
        match self {
            Self::Insert(record) | Self::Update(record) => record,
        }
    }
}

/// Committed records plus a lock per (tenant, reference id) that is held by the
/// unit of work with an uncommitted insert of that pair
#[derive(Debug, Default)]
struct SharedTable {
    records: RwLock<HashMap<RecordKey, TenantApiKey>>,
    row_locks: Mutex<HashMap<RecordKey, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug, Default)]
struct UnitOfWork {
    /// Writes per pair, most recent last
    staged: HashMap<RecordKey, Vec<StagedWrite>>,
    held: HashMap<RecordKey, OwnedMutexGuard<()>>,
}

impl UnitOfWork {
    fn current(&self, key: &RecordKey) -> Option<&StagedWrite> {
        self.staged.get(key).and_then(|writes| writes.last())
    }

    fn clear(&mut self) {
        self.staged.clear();
        self.held.clear();
    }
}

/// In-memory unit of work over a shared table of committed records.
///
/// Each repository value stages its own writes; [`session`](Self::session) opens another
/// unit of work over the same committed data. An uncommitted insert blocks inserts of the
/// same pair from other sessions until it commits or rolls back.
#[derive(Debug, Default)]
pub struct InMemoryTenantApiKeyRepository {
    table: Arc<SharedTable>,
    work: Mutex<UnitOfWork>,
}

impl InMemoryTenantApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with committed records
    pub fn with_records(records: Vec<TenantApiKey>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (record_key(r.tenant_id(), r.reference_id()), r))
            .collect();

        Self {
            table: Arc::new(SharedTable {
                records: RwLock::new(records),
                row_locks: Mutex::default(),
            }),
            work: Mutex::default(),
        }
    }

    /// New unit of work sharing this repository's committed records
    pub fn session(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            work: Mutex::default(),
        }
    }

    /// Number of committed records
    pub fn committed_count(&self) -> usize {
        self.table.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of pairs with staged, uncommitted writes
    pub fn pending_count(&self) -> usize {
        self.work.lock().map(|w| w.staged.len()).unwrap_or(0)
    }

    fn lock_work(&self) -> Result<MutexGuard<'_, UnitOfWork>, DomainError> {
        self.work
            .lock()
            .map_err(|e| DomainError::storage(format!("Failed to acquire staging lock: {}", e)))
    }

    fn staged_record(&self, key: &RecordKey) -> Result<Option<TenantApiKey>, DomainError> {
        Ok(self.lock_work()?.current(key).map(|w| w.record().clone()))
    }

    fn committed_record(&self, key: &RecordKey) -> Result<Option<TenantApiKey>, DomainError> {
        let records = self.table.records.read().map_err(|e| {
            DomainError::storage(format!("Failed to acquire read lock: {}", e))
        })?;

        Ok(records.get(key).cloned())
    }

    fn lookup(&self, key: &RecordKey) -> Result<Option<TenantApiKey>, DomainError> {
        match self.staged_record(key)? {
            Some(record) => Ok(Some(record)),
            None => self.committed_record(key),
        }
    }

    fn row_lock(&self, key: &RecordKey) -> Result<Arc<tokio::sync::Mutex<()>>, DomainError> {
        let mut locks = self.table.row_locks.lock().map_err(|e| {
            DomainError::storage(format!("Failed to acquire row lock table: {}", e))
        })?;

        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }
}

#[async_trait]
impl TenantApiKeyRepository for InMemoryTenantApiKeyRepository {
    async fn find(
        &self,
        tenant_id: &str,
        reference_id: &str,
    ) -> Result<Option<TenantApiKey>, DomainError> {
        self.lookup(&record_key(tenant_id, reference_id))
    }

    async fn insert(&self, record: TenantApiKey) -> Result<TenantApiKey, DomainError> {
        match self.insert_or_fetch(record).await? {
            InsertOutcome::Inserted(record) => Ok(record),
            InsertOutcome::Existing(existing) => Err(DomainError::conflict(format!(
                "API key '{}' already exists for tenant '{}'",
                existing.reference_id(),
                existing.tenant_id()
            ))),
        }
    }

    async fn insert_or_fetch(&self, record: TenantApiKey) -> Result<InsertOutcome, DomainError> {
        let key = record_key(record.tenant_id(), record.reference_id());

        if let Some(existing) = self.staged_record(&key)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        // waits while another session holds an uncommitted insert of this pair
        let guard = self.row_lock(&key)?.lock_owned().await;

        if let Some(existing) = self.committed_record(&key)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        let mut work = self.lock_work()?;
        work.staged
            .entry(key.clone())
            .or_default()
            .push(StagedWrite::Insert(record.clone()));
        work.held.insert(key, guard);

        Ok(InsertOutcome::Inserted(record))
    }

    async fn update_key_hash(
        &self,
        tenant_id: &str,
        reference_id: &str,
        key_hash: &str,
    ) -> Result<TenantApiKey, DomainError> {
        let key = record_key(tenant_id, reference_id);

        let mut record = self
            .lookup(&key)?
            .ok_or_else(|| DomainError::record_not_found(tenant_id, reference_id))?;
        record.set_key_hash(key_hash);

        let mut work = self.lock_work()?;
        let write = match work.current(&key) {
            Some(StagedWrite::Insert(_)) => StagedWrite::Insert(record.clone()),
            _ => StagedWrite::Update(record.clone()),
        };
        work.staged.entry(key).or_default().push(write);

        Ok(record)
    }

    async fn discard(&self, tenant_id: &str, reference_id: &str) -> Result<(), DomainError> {
        let key = record_key(tenant_id, reference_id);
        let mut work = self.lock_work()?;

        let emptied = match work.staged.get_mut(&key) {
            Some(writes) => {
                writes.pop();
                writes.is_empty()
            }
            None => false,
        };

        if emptied {
            work.staged.remove(&key);
            work.held.remove(&key);
        }

        Ok(())
    }

    async fn commit(&self) -> Result<(), DomainError> {
        let mut work = self.lock_work()?;

        let mut records = self.table.records.write().map_err(|e| {
            DomainError::storage(format!("Failed to acquire write lock: {}", e))
        })?;

        // validate everything first so a failed commit applies nothing
        for key in work.staged.keys() {
            match work.current(key) {
                Some(StagedWrite::Insert(_)) if records.contains_key(key) => {
                    return Err(DomainError::conflict(format!(
                        "API key '{}' already exists for tenant '{}'",
                        key.1, key.0
                    )));
                }
                Some(StagedWrite::Update(_)) if !records.contains_key(key) => {
                    return Err(DomainError::record_not_found(&key.0, &key.1));
                }
                _ => {}
            }
        }

        for (key, mut writes) in work.staged.drain() {
            if let Some(write) = writes.pop() {
                records.insert(key, write.into_record());
            }
        }
        drop(records);

        work.clear();
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DomainError> {
        self.lock_work()?.clear();
        Ok(())
    }
}
