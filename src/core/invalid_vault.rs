//! Manager bound in place of one that failed to load.
//!
//! Every operation returns the original failure, so later use reports the
//! root cause rather than a missing manager.

use crate::core::vault::CredentialVault;
use crate::error::VaultError;

pub struct InvalidVault {
    service: String,
    display_name: String,
    cause: String,
}

impl InvalidVault {
    pub fn new(service: &str, display_name: &str, cause: &VaultError) -> Self {
        Self {
            service: service.to_string(),
            display_name: display_name.to_string(),
            cause: cause.to_string(),
        }
    }

    fn fail<T>(&self) -> Result<T, VaultError> {
        Err(VaultError::BackendUnavailable {
            name: self.display_name.clone(),
            reason: self.cause.clone(),
        })
    }
}

impl CredentialVault for InvalidVault {
    fn service(&self) -> &str {
        &self.service
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn load(&self, _account: &str, _optional: bool) -> Result<Option<String>, VaultError> {
        self.fail()
    }

    fn save(&self, _account: &str, _secret: &str) -> Result<(), VaultError> {
        self.fail()
    }

    fn delete(&self, _account: &str) -> Result<bool, VaultError> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_operation_reports_cause() {
        let cause = VaultError::store("svc", "acct", "dbus connection refused");
        let vault = InvalidVault::new("svc", "Broken Manager", &cause);
        for err in [
            vault.load("a", true).unwrap_err(),
            vault.save("a", "b").unwrap_err(),
            vault.delete("a").unwrap_err(),
        ] {
            let msg = err.to_string();
            assert!(msg.contains("Broken Manager"));
            assert!(msg.contains("dbus connection refused"));
        }
    }
}
