//! Tenant API key domain
//!
//! Record types, roles and the repository trait for tenant-scoped API keys.

mod entity;
mod repository;
mod role;
mod validation;

pub use entity::{secret_name, RotatedApiKey, TenantApiKey};
pub use repository::{InsertOutcome, TenantApiKeyRepository};
pub use role::{ReferenceRoleResolver, Role, RoleResolver, WEBHOOK_REFERENCE_ID};
pub use validation::{validate_reference_id, validate_tenant_id, IdentifierValidationError};
