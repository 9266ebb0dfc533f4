//! Default credential manager backed by the operating-system keychain.
//!
//! Secrets are written under one primary service name. Reads also search the
//! service names used by earlier releases, but only when the primary is the
//! built-in service; a third-party service never inherits those fallbacks.
//!
//! Some platforms cap the size of a single keychain cell. Values longer than
//! [`MAX_CELL_LEN`] characters get a terminator appended and are split across
//! `account-1`, `account-2`, ... A reader that finds nothing under the bare
//! account probes those indices in order until it sees the terminator.

use crate::constants::{
    CHUNK_TERMINATOR, DEFAULT_SERVICE_NAME, LEGACY_SERVICE_NAMES, MAX_CELL_LEN,
};
use crate::core::os_store::KeyringStore;
use crate::core::vault::{CredentialVault, SecretStore};
use crate::error::VaultError;
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub struct DefaultVault {
    display_name: String,
    /// Primary service first, then fallbacks.
    services: Vec<String>,
    store: Arc<dyn SecretStore>,
    /// Set by `initialize` when the store cannot be reached.
    load_error: Option<String>,
}

impl DefaultVault {
    /// Keychain-backed manager for `service`, reported as `display_name`.
    pub fn new(service: &str, display_name: &str) -> Self {
        Self::with_store(service, display_name, Arc::new(KeyringStore))
    }

    pub fn with_store(service: &str, display_name: &str, store: Arc<dyn SecretStore>) -> Self {
        let mut services = vec![service.to_string()];
        if service == DEFAULT_SERVICE_NAME {
            for legacy in LEGACY_SERVICE_NAMES {
                if !services.iter().any(|s| s == legacy) {
                    services.push(legacy.to_string());
                }
            }
        }
        Self {
            display_name: display_name.to_string(),
            services,
            store,
            load_error: None,
        }
    }

    /// Every service name searched, primary first.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    fn primary(&self) -> &str {
        &self.services[0]
    }

    fn check_store(&self) -> Result<(), VaultError> {
        match &self.load_error {
            Some(reason) => Err(VaultError::BackendUnavailable {
                name: self.display_name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Reassemble a chunked value stored under `service`.
    fn get_chunked(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        let mut value = Zeroizing::new(String::new());
        let mut index = 1;
        while let Some(part) = self.store.get(service, &chunk_account(account, index))? {
            value.push_str(&part);
            if value.ends_with(CHUNK_TERMINATOR) {
                value.pop();
                return Ok(Some(value.to_string()));
            }
            index += 1;
        }
        if index > 1 {
            warn!(
                "incomplete chunked secret for {}/{}: {} part(s) without terminator",
                service,
                account,
                index - 1
            );
        }
        Ok(None)
    }

    /// Remove the bare cell and every chunk for `account` under `service`.
    fn delete_in(&self, service: &str, account: &str) -> Result<bool, VaultError> {
        let mut removed = self.store.delete(service, account)?;
        let mut index = 1;
        while self.store.delete(service, &chunk_account(account, index))? {
            removed = true;
            index += 1;
        }
        Ok(removed)
    }
}

impl CredentialVault for DefaultVault {
    fn service(&self) -> &str {
        self.primary()
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Probe the keychain. A missing or locked keychain is remembered and
    /// reported by each later operation instead of failing the bind.
    fn initialize(&mut self) -> Result<(), VaultError> {
        match self.store.probe() {
            Ok(()) => self.load_error = None,
            Err(e) => {
                warn!("OS credential store unavailable: {}", e);
                self.load_error = Some(format!("OS credential store unavailable: {}", e));
            }
        }
        Ok(())
    }

    fn load(&self, account: &str, optional: bool) -> Result<Option<String>, VaultError> {
        self.check_store()?;
        for service in &self.services {
            if let Some(value) = self.store.get(service, account)? {
                debug!("loaded {} from service {}", account, service);
                return Ok(Some(value));
            }
            if let Some(value) = self.get_chunked(service, account)? {
                debug!("loaded chunked {} from service {}", account, service);
                return Ok(Some(value));
            }
        }
        if optional {
            return Ok(None);
        }
        Err(VaultError::SecretNotFound {
            services: self.services.join(", "),
            account: account.to_string(),
        })
    }

    fn save(&self, account: &str, secret: &str) -> Result<(), VaultError> {
        self.check_store()?;
        for service in &self.services[1..] {
            if let Err(e) = self.delete_in(service, account) {
                warn!("could not remove stale {}/{}: {}", service, account, e);
            }
        }

        let primary = self.primary();
        self.delete_in(primary, account)?;

        if secret.chars().count() <= MAX_CELL_LEN {
            return self.store.set(primary, account, secret);
        }

        let mut payload = Zeroizing::new(String::with_capacity(secret.len() + 1));
        payload.push_str(secret);
        payload.push(CHUNK_TERMINATOR);
        for (i, cell) in split_cells(&payload, MAX_CELL_LEN).into_iter().enumerate() {
            self.store.set(primary, &chunk_account(account, i + 1), cell)?;
        }
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<bool, VaultError> {
        self.check_store()?;
        let mut removed = false;
        for service in &self.services {
            removed |= self.delete_in(service, account)?;
        }
        Ok(removed)
    }
}

fn chunk_account(account: &str, index: usize) -> String {
    format!("{}-{}", account, index)
}

/// Split `value` into slices of at most `limit` characters, in order.
fn split_cells(value: &str, limit: usize) -> Vec<&str> {
    let mut cells = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in value.char_indices() {
        if count == limit {
            cells.push(&value[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < value.len() {
        cells.push(&value[start..]);
    }
    cells
}
