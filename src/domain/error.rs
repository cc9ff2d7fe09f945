use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("API key record not found: tenant '{tenant_id}', reference '{reference_id}'")]
    RecordNotFound {
        tenant_id: String,
        reference_id: String,
    },

    #[error("Secret not found: {name}")]
    SecretNotFound { name: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Secret store error: {backend} - {message}")]
    SecretStore { backend: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DomainError {
    pub fn record_not_found(tenant_id: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            tenant_id: tenant_id.into(),
            reference_id: reference_id.into(),
        }
    }

    pub fn secret_not_found(name: impl Into<String>) -> Self {
        Self::SecretNotFound { name: name.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn secret_store(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SecretStore {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
