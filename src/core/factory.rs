//! Binding factory: resolves, constructs, and freezes the one credential
//! manager used by this process.
//!
//! The factory is created once at start-up and handed by reference to
//! everything that needs secrets. Binding happens at most once; afterwards
//! the manager is only reachable as an `Arc<dyn CredentialVault>`, which
//! offers no way to replace or mutate it.
//!
//! Third-party backends are made available by [`BindingFactory::register_backend`]
//! before binding and are then selected by name.

use crate::constants::DEFAULT_SERVICE_NAME;
use crate::core::default_vault::DefaultVault;
use crate::core::invalid_vault::InvalidVault;
use crate::core::vault::CredentialVault;
use crate::error::VaultError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, error};

/// Arguments handed to a backend constructor.
#[derive(Debug, Clone)]
pub struct BackendParams {
    pub service: String,
    pub display_name: String,
    /// `credentialManagerOptions` from the settings file, if any.
    pub options: Option<Map<String, Value>>,
}

pub type BackendCtor =
    Arc<dyn Fn(&BackendParams) -> Result<Box<dyn CredentialVault>, VaultError> + Send + Sync>;

/// Which manager to bind.
#[derive(Clone, Default)]
pub enum BackendRef {
    /// The built-in keychain provider.
    #[default]
    Default,
    /// A constructor supplied directly by the caller.
    Constructor(BackendCtor),
    /// A constructor previously registered under this name.
    Registered(String),
}

impl std::fmt::Debug for BackendRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendRef::Default => write!(f, "Default"),
            BackendRef::Constructor(_) => write!(f, "Constructor(..)"),
            BackendRef::Registered(id) => write!(f, "Registered({:?})", id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InitParams {
    pub backend: BackendRef,
    /// Defaults to [`DEFAULT_SERVICE_NAME`].
    pub service: Option<String>,
    /// Defaults to the service name.
    pub display_name: Option<String>,
    /// Bind a failing stub instead of returning the error.
    pub invalid_on_failure: bool,
    pub options: Option<Map<String, Value>>,
}

#[derive(Default)]
pub struct BindingFactory {
    registered: Mutex<BTreeMap<String, BackendCtor>>,
    bind_started: AtomicBool,
    manager: OnceLock<Arc<dyn CredentialVault>>,
}

impl BindingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a backend constructor selectable by `id`. Must happen before
    /// the factory binds; a later registration could never take effect.
    pub fn register_backend<F>(&self, id: &str, ctor: F) -> Result<(), VaultError>
    where
        F: Fn(&BackendParams) -> Result<Box<dyn CredentialVault>, VaultError>
            + Send
            + Sync
            + 'static,
    {
        if self.bind_started.load(Ordering::SeqCst) {
            return Err(VaultError::AlreadyBound);
        }
        self.registry()?.insert(id.to_string(), Arc::new(ctor));
        debug!("registered credential manager \"{}\"", id);
        Ok(())
    }

    /// Names accepted by [`BackendRef::Registered`].
    pub fn registered_backends(&self) -> Vec<String> {
        self.registry()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Bind the credential manager. Only the first call in a process may
    /// proceed; every later call fails with [`VaultError::AlreadyBound`]
    /// without touching the bound manager.
    ///
    /// Construction and `initialize` failures share one path: with
    /// `invalid_on_failure` a stub reporting the failure is bound, otherwise
    /// the error is returned and nothing is bound.
    pub fn initialize(&self, params: InitParams) -> Result<(), VaultError> {
        if self.bind_started.swap(true, Ordering::SeqCst) {
            return Err(VaultError::AlreadyBound);
        }

        let service = params
            .service
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let display_name = params.display_name.clone().unwrap_or_else(|| service.clone());
        let backend_params = BackendParams {
            service: service.clone(),
            display_name: display_name.clone(),
            options: params.options.clone(),
        };

        let built = self
            .construct(&params.backend, &backend_params)
            .and_then(|mut manager| {
                manager.initialize()?;
                Ok(manager)
            });

        let manager: Arc<dyn CredentialVault> = match built {
            Ok(manager) => {
                debug!(
                    "Initialized the \"{}\" credential manager for \"{}\".",
                    display_name, service
                );
                Arc::from(manager)
            }
            Err(e) => {
                if !matches!(params.backend, BackendRef::Default) {
                    error!("Failed to load the credential manager named \"{}\"", display_name);
                    error!("{}", e);
                }
                if !params.invalid_on_failure {
                    return Err(e);
                }
                Arc::new(InvalidVault::new(&service, &display_name, &e))
            }
        };

        self.manager.set(manager).map_err(|_| VaultError::AlreadyBound)
    }

    /// The bound manager.
    pub fn manager(&self) -> Result<Arc<dyn CredentialVault>, VaultError> {
        self.manager.get().cloned().ok_or(VaultError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.get().is_some()
    }

    fn construct(
        &self,
        backend: &BackendRef,
        params: &BackendParams,
    ) -> Result<Box<dyn CredentialVault>, VaultError> {
        match backend {
            BackendRef::Default => Ok(Box::new(DefaultVault::new(
                &params.service,
                &params.display_name,
            ))),
            BackendRef::Constructor(ctor) => ctor(params),
            BackendRef::Registered(id) => {
                let ctor = self.registry()?.get(id).cloned();
                match ctor {
                    Some(ctor) => ctor(params),
                    None => Err(VaultError::BackendUnavailable {
                        name: id.clone(),
                        reason: "no credential manager is registered under this name".to_string(),
                    }),
                }
            }
        }
    }

    fn registry(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, BackendCtor>>, VaultError> {
        self.registered.lock().map_err(|_| VaultError::BackendUnavailable {
            name: "registry".to_string(),
            reason: "backend registry lock poisoned".to_string(),
        })
    }
}
