//! Error taxonomy for vault binding, the override registry, secure config
//! storage, and legacy profile conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the binding factory and by vault implementations.
#[derive(Error, Debug, Clone)]
pub enum VaultError {
    #[error(
        "a credential manager has already been bound; \
         the binding can only be made once per process"
    )]
    AlreadyBound,

    #[error(
        "credential manager not yet initialized; \
         the binding factory must be initialized before the manager is used"
    )]
    NotInitialized,

    #[error("credential manager \"{name}\" is unavailable: {reason}")]
    BackendUnavailable { name: String, reason: String },

    #[error(
        "Unable to load credentials. \
         Could not find an entry in the credential vault for the following:\n  \
         Service = {services}\n  Account = {account}"
    )]
    SecretNotFound { services: String, account: String },

    #[error("credential store error for {service}/{account}: {reason}")]
    Store {
        service: String,
        account: String,
        reason: String,
    },
}

impl VaultError {
    pub fn store(service: &str, account: &str, reason: impl ToString) -> Self {
        VaultError::Store {
            service: service.to_string(),
            account: account.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the credential manager override registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(
        "The credential manager name '{name}' is an unknown credential manager. \
         The previous credential manager will NOT be overridden. \
         Valid credential managers are:{valid}"
    )]
    UnknownBackend { name: String, valid: String },

    #[error(
        "An attempt to revert Credential Manager = '{caller}' \
         to the default Credential Manager = '{default}' failed. \
         The value '{caller}' must be the current value in settings file = '{}'. \
         Instead, the current value is '{current}'. \
         The current Credential Manager has not been replaced.",
        .path.display()
    )]
    NotIncumbent {
        caller: String,
        current: String,
        default: String,
        path: PathBuf,
    },

    #[error("Unable to read settings file = {}\nReason: {reason}", .path.display())]
    SettingsRead { path: PathBuf, reason: String },

    #[error("Unable to write settings file = {}\nReason: {reason}", .path.display())]
    SettingsWrite { path: PathBuf, reason: String },
}

/// Errors raised while loading or saving configuration layers.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config layer {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("write config layer {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },

    #[error("secure properties: {0}")]
    Secure(#[from] VaultError),

    #[error("secure property blob is malformed: {0}")]
    SecureBlob(String),
}

/// Errors raised by the legacy profile conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A single item could not be processed; conversion continues.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// A legacy file was readable but not parseable.
    #[error("{context}: {reason}")]
    Parse { context: String, reason: String },

    /// Setup-level failure that aborts the remaining steps.
    #[error("{0}")]
    Fatal(String),
}

impl ConvertError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the underlying cause is a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConvertError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

impl From<ConfigError> for ConvertError {
    fn from(err: ConfigError) -> Self {
        ConvertError::Fatal(err.to_string())
    }
}

impl From<VaultError> for ConvertError {
    fn from(err: VaultError) -> Self {
        ConvertError::Fatal(err.to_string())
    }
}
