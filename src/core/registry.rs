//! Credential manager override registry.
//!
//! Knows the catalog of credential managers and reads/writes which one is
//! selected in `<home>/settings/imperative.json`. Plugins call
//! [`Registry::record_override`] when they are installed and
//! [`Registry::revert_to_default`] when they are removed. A plugin can only
//! revert the setting while it is the incumbent, so one plugin cannot evict
//! another.

use crate::constants::{
    CRED_MGR_SETTING_NAME, DEFAULT_BACKEND_NAME, SETTINGS_DIR, SETTINGS_DIR_MODE, SETTINGS_FILE,
    SETTINGS_FILE_MODE,
};
use crate::core::file_lock::FileLock;
use crate::error::RegistryError;
use crate::models::backend::{BackendIdentity, SelectedBackend, KNOWN_BACKENDS};
use crate::models::settings::{CredMgrSetting, SettingsFile};
use crate::util::fs as cl_fs;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Registry {
    settings_path: PathBuf,
}

impl Registry {
    pub fn new(cli_home: &Path) -> Self {
        Self {
            settings_path: cli_home.join(SETTINGS_DIR).join(SETTINGS_FILE),
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn known_backends() -> &'static [BackendIdentity] {
        KNOWN_BACKENDS
    }

    pub fn by_display_name(name: &str) -> Option<&'static BackendIdentity> {
        KNOWN_BACKENDS.iter().find(|b| b.display_name == name)
    }

    pub fn by_extension_package(package: &str) -> Option<&'static BackendIdentity> {
        KNOWN_BACKENDS
            .iter()
            .find(|b| b.extension_package_name == Some(package))
    }

    pub fn by_host_integration(name: &str) -> Option<&'static BackendIdentity> {
        KNOWN_BACKENDS
            .iter()
            .find(|b| b.host_integration_name == Some(name))
    }

    /// Select `new_name` as the credential manager, optionally replacing the
    /// backend-specific options.
    pub fn record_override(
        &self,
        new_name: &str,
        options: Option<Map<String, Value>>,
    ) -> Result<(), RegistryError> {
        if Self::by_display_name(new_name).is_none() {
            let valid: String = KNOWN_BACKENDS
                .iter()
                .map(|b| format!("\n{}", b.display_name))
                .collect();
            return Err(RegistryError::UnknownBackend {
                name: new_name.to_string(),
                valid,
            });
        }

        let _lock = self.lock()?;
        let mut settings = self.read_settings()?;
        settings.overrides.credential_manager = Some(CredMgrSetting::Name(new_name.to_string()));
        if options.is_some() {
            settings.credential_manager_options = options;
        }
        self.write_settings(&settings)?;
        info!("credential manager override set to '{}'", new_name);
        Ok(())
    }

    /// Restore the default credential manager. `caller` must be the value
    /// currently recorded; otherwise nothing is written.
    pub fn revert_to_default(&self, caller: &str) -> Result<(), RegistryError> {
        let _lock = self.lock()?;
        let mut settings = self.read_settings()?;

        let current = settings
            .selected()
            .unwrap_or_else(SelectedBackend::default_backend);
        if current.name() != Some(caller) {
            return Err(RegistryError::NotIncumbent {
                caller: caller.to_string(),
                current: current.to_string(),
                default: DEFAULT_BACKEND_NAME.to_string(),
                path: self.settings_path.clone(),
            });
        }

        settings.overrides.credential_manager =
            Some(CredMgrSetting::Name(DEFAULT_BACKEND_NAME.to_string()));
        settings.credential_manager_options = None;
        self.write_settings(&settings)?;
        info!("credential manager '{}' reverted to default", caller);
        Ok(())
    }

    /// The selected manager. Falls back to the default when the settings
    /// file is missing or unreadable, so a broken settings file never blocks
    /// ordinary commands.
    pub fn current(&self) -> SelectedBackend {
        match self.read_settings() {
            Ok(settings) => settings
                .selected()
                .unwrap_or_else(SelectedBackend::default_backend),
            Err(e) => {
                debug!("using default credential manager: {}", e);
                SelectedBackend::default_backend()
            }
        }
    }

    /// Backend-specific options, if the settings file has any.
    pub fn current_options(&self) -> Option<Map<String, Value>> {
        self.read_settings()
            .ok()
            .and_then(|s| s.credential_manager_options)
    }

    /// Read the settings document. It must contain `overrides.CredentialManager`.
    pub fn read_settings(&self) -> Result<SettingsFile, RegistryError> {
        let read_err = |reason: String| RegistryError::SettingsRead {
            path: self.settings_path.clone(),
            reason,
        };
        let content = fs::read_to_string(&self.settings_path).map_err(|e| read_err(e.to_string()))?;
        let settings: SettingsFile =
            serde_json::from_str(&content).map_err(|e| read_err(e.to_string()))?;
        if settings.overrides.credential_manager.is_none() {
            return Err(read_err(format!(
                "The property key 'overrides.{}' does not exist",
                CRED_MGR_SETTING_NAME
            )));
        }
        Ok(settings)
    }

    /// Create the settings file selecting the default manager if it does
    /// not exist. Returns true when the file was created.
    pub fn ensure_settings(&self) -> Result<bool, RegistryError> {
        if self.settings_path.exists() {
            return Ok(false);
        }
        if let Some(dir) = self.settings_path.parent() {
            cl_fs::ensure_dir(dir, SETTINGS_DIR_MODE).map_err(|e| RegistryError::SettingsWrite {
                path: self.settings_path.clone(),
                reason: e.to_string(),
            })?;
        }
        let _lock = self.lock()?;
        if self.settings_path.exists() {
            return Ok(false);
        }
        self.write_settings(&SettingsFile::with_backend(DEFAULT_BACKEND_NAME))?;
        Ok(true)
    }

    fn write_settings(&self, settings: &SettingsFile) -> Result<(), RegistryError> {
        cl_fs::write_json_atomic(&self.settings_path, settings, SETTINGS_FILE_MODE).map_err(|e| {
            RegistryError::SettingsWrite {
                path: self.settings_path.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn lock(&self) -> Result<FileLock, RegistryError> {
        FileLock::guard(&self.settings_path).map_err(|e| {
            RegistryError::SettingsRead {
                path: self.settings_path.clone(),
                reason: format!("cannot lock settings file: {}", e),
            }
        })
    }
}
