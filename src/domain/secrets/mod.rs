//! Secret storage domain

mod store;

pub use store::SecretStore;

#[cfg(test)]
pub use store::MockSecretStore;
