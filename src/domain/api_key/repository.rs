//! Tenant API key repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::TenantApiKey;
use crate::domain::DomainError;

/// Result of an atomic insert-or-fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was staged by this call
    Inserted(TenantApiKey),
    /// A record for the same (tenant, reference id) already existed
    Existing(TenantApiKey),
}

impl InsertOutcome {
    pub fn record(&self) -> &TenantApiKey {
        match self {
            Self::Inserted(record) | Self::Existing(record) => record,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Repository for tenant API key records.
///
/// An implementation is bound to a unit of work owned by the caller. Inserts and
/// updates are staged and only become durable on [`commit`](Self::commit); reads see
/// the unit of work's own staged writes. At most one record may exist per
/// (tenant id, reference id); an insert racing another unit of work's uncommitted insert
/// of the same pair waits for that unit of work to finish.
#[async_trait]
pub trait TenantApiKeyRepository: Send + Sync + Debug {
    /// Find the record for a (tenant, reference id) pair
    async fn find(
        &self,
        tenant_id: &str,
        reference_id: &str,
    ) -> Result<Option<TenantApiKey>, DomainError>;

    /// Stage a new record, failing with `Conflict` if the pair already exists
    async fn insert(&self, record: TenantApiKey) -> Result<TenantApiKey, DomainError>;

    /// Stage a new record unless one exists, in a single atomic step
    async fn insert_or_fetch(&self, record: TenantApiKey) -> Result<InsertOutcome, DomainError>;

    /// Stage a new key hash on an existing record
    async fn update_key_hash(
        &self,
        tenant_id: &str,
        reference_id: &str,
        key_hash: &str,
    ) -> Result<TenantApiKey, DomainError>;

    /// Undo the most recent staged write for a pair, leaving every other staged write
    /// in place. A no-op when nothing is staged for the pair.
    async fn discard(&self, tenant_id: &str, reference_id: &str) -> Result<(), DomainError>;

    /// Make staged writes durable
    async fn commit(&self) -> Result<(), DomainError>;

    /// Discard all staged writes
    async fn rollback(&self) -> Result<(), DomainError>;
}
