//! Key record store implementations

mod factory;
mod in_memory;
mod postgres;

pub use factory::{RecordStoreConfig, RecordStoreFactory, RecordStoreType};
pub use in_memory::InMemoryTenantApiKeyRepository;
pub use postgres::{PostgresConfig, PostgresTenantApiKeyRepository, DEFAULT_TABLE_NAME};
