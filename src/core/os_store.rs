//! Secret stores behind the vault boundary: the OS keychain and an
//! in-process map.

use crate::core::vault::SecretStore;
use crate::error::VaultError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const PROBE_ACCOUNT: &str = "__credlayer_probe__";

/// OS keychain access via the `keyring` crate:
/// macOS Keychain, Windows Credential Manager, Linux Secret Service.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl KeyringStore {
    fn entry(service: &str, account: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(service, account).map_err(|e| VaultError::store(service, account, e))
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        match Self::entry(service, account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(VaultError::store(service, account, e)),
        }
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        Self::entry(service, account)?
            .set_password(value)
            .map_err(|e| VaultError::store(service, account, e))
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, VaultError> {
        match Self::entry(service, account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(VaultError::store(service, account, e)),
        }
    }

    fn probe(&self) -> Result<(), VaultError> {
        // A lookup of a nonexistent entry exercises the platform store
        // without touching real secrets.
        match Self::entry(crate::constants::DEFAULT_SERVICE_NAME, PROBE_ACCOUNT)?.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                debug!("keychain probe failed: {}", e);
                Err(VaultError::store(
                    crate::constants::DEFAULT_SERVICE_NAME,
                    PROBE_ACCOUNT,
                    e,
                ))
            }
        }
    }
}

/// In-process store. Clones share the same cells.
///
/// Used by tests and wherever a keychain is not wanted; contents are lost
/// when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    cells: Arc<Mutex<BTreeMap<(String, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> Result<MutexGuard<'_, BTreeMap<(String, String), String>>, VaultError> {
        self.cells
            .lock()
            .map_err(|_| VaultError::store("memory", "*", "store lock poisoned"))
    }

    /// Number of cells across all services.
    pub fn len(&self) -> usize {
        self.cells().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        Ok(self
            .cells()?
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        self.cells()?
            .insert((service.to_string(), account.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, VaultError> {
        Ok(self
            .cells()?
            .remove(&(service.to_string(), account.to_string()))
            .is_some())
    }

    fn accounts(&self, service: &str) -> Option<Result<Vec<String>, VaultError>> {
        Some(self.cells().map(|cells| {
            cells
                .keys()
                .filter(|(svc, _)| svc == service)
                .map(|(_, account)| account.clone())
                .collect()
        }))
    }
}
