//! Start-up binding of the credential manager named in the settings file.

use crate::constants::{DEFAULT_BACKEND_NAME, DEFAULT_SERVICE_NAME};
use crate::core::factory::{BackendRef, BindingFactory, InitParams};
use crate::core::registry::Registry;
use crate::error::VaultError;
use crate::models::backend::SelectedBackend;
use tracing::debug;

/// Bind the selected credential manager.
///
/// The built-in manager is bound with `invalid_on_failure = false`: if it
/// cannot be built, start-up must stop. Any other name resolves to a
/// registered backend and binds a failing stub when that does not work, so
/// a broken plugin cannot take the CLI down. A disabled manager binds
/// nothing.
pub fn load_overrides(factory: &BindingFactory, registry: &Registry) -> Result<(), VaultError> {
    let params = match registry.current() {
        SelectedBackend::Disabled => {
            debug!("credential manager disabled in settings; nothing bound");
            return Ok(());
        }
        selected if selected.is_default() => InitParams {
            backend: BackendRef::Default,
            service: Some(DEFAULT_SERVICE_NAME.to_string()),
            display_name: Some(DEFAULT_BACKEND_NAME.to_string()),
            invalid_on_failure: false,
            options: registry.current_options(),
        },
        SelectedBackend::Named(name) => InitParams {
            backend: BackendRef::Registered(name.clone()),
            service: Some(DEFAULT_SERVICE_NAME.to_string()),
            display_name: Some(name),
            invalid_on_failure: true,
            options: registry.current_options(),
        },
    };
    factory.initialize(params)
}
