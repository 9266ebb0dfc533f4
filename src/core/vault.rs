//! Vault capability contract and the operating-system store boundary.
//!
//! The framework only ever talks to a [`CredentialVault`]. Concrete
//! managers (the default keychain provider, a third-party backend, or the
//! failure stub) are bound once by the binding factory and then shared
//! read-only, so every method takes `&self` except [`CredentialVault::initialize`],
//! which runs before the instance is frozen.

use crate::error::VaultError;

/// Operations every credential manager provides.
pub trait CredentialVault: Send + Sync {
    /// Service name secrets are grouped under.
    fn service(&self) -> &str;

    /// Human-readable manager name, used in log and error messages.
    fn display_name(&self) -> &str;

    /// One-time setup after construction. A failure here is handled like a
    /// construction failure by the binding factory.
    fn initialize(&mut self) -> Result<(), VaultError> {
        Ok(())
    }

    /// Load the secret stored for `account`.
    ///
    /// When `optional` is false a missing secret is an error; otherwise it
    /// is reported as `Ok(None)`.
    fn load(&self, account: &str, optional: bool) -> Result<Option<String>, VaultError>;

    fn save(&self, account: &str, secret: &str) -> Result<(), VaultError>;

    /// Returns true if anything was removed.
    fn delete(&self, account: &str) -> Result<bool, VaultError>;
}

/// Raw `(service, account)` cells in an operating-system secret store.
pub trait SecretStore: Send + Sync {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError>;

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError>;

    /// Returns true if an entry existed and was removed.
    fn delete(&self, service: &str, account: &str) -> Result<bool, VaultError>;

    /// Check that the store can be reached at all.
    fn probe(&self) -> Result<(), VaultError> {
        Ok(())
    }

    /// Accounts stored under `service`, for stores that can enumerate.
    /// `None` means the store has no listing capability.
    fn accounts(&self, _service: &str) -> Option<Result<Vec<String>, VaultError>> {
        None
    }
}
