//! Persisted settings document holding the credential manager override.

use crate::models::backend::SelectedBackend;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub overrides: Overrides,

    /// Backend-specific options, written alongside a non-default override.
    #[serde(
        rename = "credentialManagerOptions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential_manager_options: Option<Map<String, Value>>,

    /// Settings owned by other parts of the CLI; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
    #[serde(
        rename = "CredentialManager",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential_manager: Option<CredMgrSetting>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `overrides.CredentialManager` is either a display name or `false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredMgrSetting {
    Name(String),
    Flag(bool),
}

impl From<&CredMgrSetting> for SelectedBackend {
    fn from(setting: &CredMgrSetting) -> Self {
        match setting {
            CredMgrSetting::Name(name) => SelectedBackend::Named(name.clone()),
            CredMgrSetting::Flag(false) => SelectedBackend::Disabled,
            // `true` has no meaning of its own; treat it as "not overridden"
            CredMgrSetting::Flag(true) => SelectedBackend::default_backend(),
        }
    }
}

impl SettingsFile {
    /// A settings document selecting `name`, with no options.
    pub fn with_backend(name: &str) -> Self {
        let mut settings = SettingsFile::default();
        settings.overrides.credential_manager = Some(CredMgrSetting::Name(name.to_string()));
        settings
    }

    pub fn selected(&self) -> Option<SelectedBackend> {
        self.overrides.credential_manager.as_ref().map(SelectedBackend::from)
    }
}
