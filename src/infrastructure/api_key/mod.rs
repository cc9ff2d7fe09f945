//! API key issuance and rotation
//!
//! Key generation plus the manager that keeps the record store and secret store
//! in step.

mod generator;
mod manager;

pub use generator::{generate_api_key, hash_api_key, GeneratedApiKey};
pub use manager::{ApiKeyManager, NewApiKey};
