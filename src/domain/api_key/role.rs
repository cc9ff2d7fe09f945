//! Roles stamped onto API key records

use std::collections::HashMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Reference id whose system key gets the restricted webhook role
pub const WEBHOOK_REFERENCE_ID: &str = "webhook";

/// Authorization role granted to requests authenticated with a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role {
    name: String,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Full access role
    pub fn admin() -> Self {
        Self::new("admin")
    }

    /// Restricted role for inbound webhook callers
    pub fn webhook() -> Self {
        Self::new("webhook")
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Picks the role of a system key created on demand for a reference id
pub trait RoleResolver: Send + Sync + Debug {
    fn resolve(&self, reference_id: &str) -> Role;
}

/// Resolver backed by a reference id -> role table with a fallback.
///
/// The default table maps `webhook` to the webhook role and everything else to admin.
#[derive(Debug, Clone)]
pub struct ReferenceRoleResolver {
    overrides: HashMap<String, Role>,
    fallback: Role,
}

impl Default for ReferenceRoleResolver {
    fn default() -> Self {
        Self::new(Role::admin()).with_override(WEBHOOK_REFERENCE_ID, Role::webhook())
    }
}

impl ReferenceRoleResolver {
    /// Empty table; every reference id resolves to `fallback`
    pub fn new(fallback: Role) -> Self {
        Self {
            overrides: HashMap::new(),
            fallback,
        }
    }

    pub fn with_override(mut self, reference_id: impl Into<String>, role: Role) -> Self {
        self.overrides.insert(reference_id.into(), role);
        self
    }
}

impl RoleResolver for ReferenceRoleResolver {
    fn resolve(&self, reference_id: &str) -> Role {
        self.overrides
            .get(reference_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
