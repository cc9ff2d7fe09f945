use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{ReferenceRoleResolver, Role};
use crate::domain::api_key::WEBHOOK_REFERENCE_ID;
use crate::infrastructure::secrets::SecretStoreConfig;
use crate::infrastructure::storage::RecordStoreConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub record_store: RecordStoreConfig,
    pub secret_store: SecretStoreConfig,
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Roles assigned to system keys created on demand.
///
/// `overrides` is layered on top of the built-in `webhook -> webhook` entry, which only
/// changes when `webhook` is listed explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Role for reference ids without an override
    pub fallback: String,
    /// Reference id -> role name
    pub overrides: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            fallback: Role::admin().to_string(),
            overrides: HashMap::new(),
        }
    }
}

impl RolesConfig {
    pub fn resolver(&self) -> ReferenceRoleResolver {
        let builtin = ReferenceRoleResolver::new(Role::new(&self.fallback))
            .with_override(WEBHOOK_REFERENCE_ID, Role::webhook());

        self.overrides
            .iter()
            .fold(builtin, |resolver, (reference_id, role)| {
                resolver.with_override(reference_id.clone(), Role::new(role))
            })
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
