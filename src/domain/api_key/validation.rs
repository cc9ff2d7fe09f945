//! Identifier validation for tenant API keys

use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while validating a tenant or reference identifier
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentifierValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{0} exceeds maximum length of {1} characters")]
    TooLong(&'static str, usize),

    #[error("{0} contains invalid character: {1:?}")]
    InvalidCharacter(&'static str, char),
}

impl From<IdentifierValidationError> for DomainError {
    fn from(err: IdentifierValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Validate a tenant id
pub fn validate_tenant_id(id: &str) -> Result<(), IdentifierValidationError> {
    validate_identifier("tenant id", id)
}

/// Validate a reference id
pub fn validate_reference_id(id: &str) -> Result<(), IdentifierValidationError> {
    validate_identifier("reference id", id)
}

/// Rules:
/// - Cannot be empty
/// - Maximum 255 characters
/// - No whitespace or control characters
fn validate_identifier(field: &'static str, id: &str) -> Result<(), IdentifierValidationError> {
    if id.is_empty() {
        return Err(IdentifierValidationError::Empty(field));
    }

    if id.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierValidationError::TooLong(
            field,
            MAX_IDENTIFIER_LENGTH,
        ));
    }

    if let Some(c) = id.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(IdentifierValidationError::InvalidCharacter(field, c));
    }

    Ok(())
}
