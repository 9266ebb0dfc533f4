//! Identities of the credential managers this CLI knows about.

use crate::constants::DEFAULT_BACKEND_NAME;
use serde::Serialize;

/// One known credential manager.
///
/// `display_name` is the value recorded in the settings file. A plugin
/// package or host integration may provide the manager; those names are
/// used to look the entry up from the installer side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendIdentity {
    pub display_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_package_name: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_integration_name: Option<&'static str>,
}

impl BackendIdentity {
    pub fn is_default(&self) -> bool {
        self.display_name == DEFAULT_BACKEND_NAME
    }
}

pub const KNOWN_BACKENDS: &[BackendIdentity] = &[
    BackendIdentity {
        display_name: DEFAULT_BACKEND_NAME,
        extension_package_name: None,
        host_integration_name: None,
    },
    BackendIdentity {
        display_name: "Secrets for Kubernetes",
        extension_package_name: Some("@credlayer/secrets-for-kubernetes"),
        host_integration_name: Some("credlayer.secrets-for-kubernetes"),
    },
];

/// The credential manager currently selected in the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedBackend {
    /// A named manager. The name is not guaranteed to be a known one.
    Named(String),
    /// `overrides.CredentialManager` is `false`: no manager is active.
    Disabled,
}

impl SelectedBackend {
    pub fn default_backend() -> Self {
        SelectedBackend::Named(DEFAULT_BACKEND_NAME.to_string())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SelectedBackend::Named(name) => Some(name),
            SelectedBackend::Disabled => None,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name() == Some(DEFAULT_BACKEND_NAME)
    }
}

impl std::fmt::Display for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectedBackend::Named(name) => write!(f, "{}", name),
            SelectedBackend::Disabled => write!(f, "false"),
        }
    }
}
