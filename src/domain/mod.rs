//! Domain layer - Tenant API key records, roles and store traits

pub mod api_key;
pub mod error;
pub mod secrets;

pub use api_key::{
    secret_name, InsertOutcome, ReferenceRoleResolver, Role, RoleResolver, RotatedApiKey,
    TenantApiKey, TenantApiKeyRepository,
};
pub use error::DomainError;
pub use secrets::SecretStore;
