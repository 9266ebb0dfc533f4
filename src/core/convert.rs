//! Conversion of legacy per-type-directory profiles into a layered
//! configuration document.
//!
//! The run is a single pass:
//!
//! 1. Decide whether there is anything to convert. An existing configuration
//!    or an empty legacy tree ends the run.
//! 2. Replace an obsolete credential manager override with the default one,
//!    then bind a credential manager so legacy secrets can be read.
//! 3. Read every legacy profile, resolving secure markers through the
//!    credential manager, and assemble a new document.
//! 4. Save the document (secrets go to the credential manager) and rename
//!    the legacy tree aside.
//! 5. When asked, delete the renamed tree and sweep legacy secrets from the
//!    OS store. This step runs whether or not anything was converted.
//!
//! Failures of single items are recorded in the result and the run goes on.
//! Only an error outside those per-item boundaries ends the run early, and
//! it too is reported in the result rather than returned.

use crate::constants::{
    DEFAULT_SERVICE_NAME, LEGACY_SERVICE_NAMES, OBSOLETE_OVERRIDE_NAMES, OBSOLETE_SCS_PLUGIN_NAME,
    RENAMED_PROPERTIES, SECURE_ACCOUNT,
};
use crate::core::config::Config;
use crate::core::factory::BindingFactory;
use crate::core::legacy_read;
use crate::core::overrides;
use crate::core::paths::CliPaths;
use crate::core::registry::Registry;
use crate::core::schema;
use crate::core::vault::SecretStore;
use crate::error::{ConvertError, VaultError};
use crate::models::backend::SelectedBackend;
use crate::models::config_doc::{ConfigDocument, ProfileNode};
use crate::models::conversion::{ConversionResult, ConvertMsg, MsgKind, ProfileFailure};
use crate::models::legacy::ProfileTypeConfig;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A host application that reads profiles on its own and binds the
/// credential manager its own way.
pub trait ExternalProfileReader {
    /// Bind the host's credential manager through `factory`.
    fn init_credentials(&self, factory: &BindingFactory) -> Result<(), VaultError>;
}

#[derive(Default)]
pub struct ConvertOptions<'a> {
    /// Delete the legacy profiles and their secrets after converting.
    pub delete_legacy_profiles: bool,
    /// Set when a host application drives the conversion instead of the CLI.
    pub external_profile_reader: Option<&'a dyn ExternalProfileReader>,
}

/// Everything a conversion needs from its surroundings.
pub struct ConvertEnv<'a> {
    /// Legacy tree, its renamed-aside location and the plug-ins file.
    pub paths: &'a CliPaths,
    pub factory: &'a BindingFactory,
    pub registry: &'a Registry,
    /// Raw store swept for legacy secrets.
    pub secret_store: Arc<dyn SecretStore>,
}

/// Convert legacy profiles into `config`. Never fails: every problem is
/// reported in the returned result.
pub fn convert(
    env: &ConvertEnv<'_>,
    config: &mut Config,
    opts: &ConvertOptions<'_>,
) -> ConversionResult {
    let mut run = Run {
        env,
        opts,
        config,
        result: ConversionResult::default(),
        old_override_configured: false,
    };
    if let Err(e) = run.steps() {
        run.exception(
            "Encountered the following error while trying to convert legacy profiles:",
            &e,
        );
    }
    info!(
        "profile conversion finished: {} found, {} converted, {} failed",
        run.result.profiles_found,
        run.result.converted_count(),
        run.result.profiles_failed.len()
    );
    run.result
}

struct Run<'r, 'a> {
    env: &'r ConvertEnv<'a>,
    opts: &'r ConvertOptions<'a>,
    config: &'r mut Config,
    result: ConversionResult,
    old_override_configured: bool,
}

impl Run<'_, '_> {
    fn steps(&mut self) -> Result<(), ConvertError> {
        if self.conversion_needed() {
            self.replace_old_override();
            self.init_cred_mgr();
            self.move_profiles()?;
        }

        if self.opts.delete_legacy_profiles {
            self.delete_legacy();
        }

        if let Some(plugin) = self.result.selected_backend_name.clone() {
            let msg = if self.opts.external_profile_reader.is_some() {
                format!(
                    "The obsolete plug-in {} should be uninstalled because the secure \
                     credential store is now embedded within the CLI. Plug-ins can only be \
                     uninstalled by the CLI. Use the command 'credlayer plugins uninstall {}'.",
                    plugin, plugin
                )
            } else {
                format!(
                    "The obsolete plug-in {} will be uninstalled because the secure \
                     credential store is now embedded within the CLI.",
                    plugin
                )
            };
            self.report_paragraph(msg);
        }
        Ok(())
    }

    fn conversion_needed(&mut self) -> bool {
        self.result.profiles_found = 0;

        if self.config.exists() {
            let path = self.config.layer_active().path.clone();
            self.report(format!(
                "Did not convert any legacy profiles because a current configuration was \
                 found at {}.",
                path.display()
            ));
            self.result.new_config_path = Some(path);
            return false;
        }

        let root = self.env.paths.profiles.clone();
        let none_found = format!(
            "Did not convert any legacy profiles because no legacy profiles were found at {}.",
            root.display()
        );
        match legacy_read::old_profile_count(&root) {
            Ok(0) => self.report(none_found),
            Ok(n) => self.result.profiles_found = n,
            Err(e) if e.is_not_found() => self.report(none_found),
            Err(e) => {
                let intro = format!("Failed to get legacy profiles in {}.", root.display());
                self.exception(&intro, &e);
            }
        }
        self.result.profiles_found > 0
    }

    /// Reset an obsolete override to the default manager, and note an
    /// obsolete plug-in that the caller should uninstall.
    fn replace_old_override(&mut self) {
        let registry = self.env.registry;
        if let Err(e) = registry.ensure_settings() {
            self.exception(
                &format!(
                    "Failed to initialize settings overrides from {}.",
                    registry.settings_path().display()
                ),
                &e,
            );
        }

        let current = match registry.read_settings() {
            Ok(settings) => settings.selected(),
            Err(e) => {
                self.exception("Failed trying to read 'CredentialManager' overrides.", &e);
                None
            }
        };

        // `false` is left alone: it selects no credential manager at all
        if let Some(SelectedBackend::Named(name)) = current {
            if OBSOLETE_OVERRIDE_NAMES.iter().any(|old| name.contains(old)) {
                self.old_override_configured = true;
                match registry.revert_to_default(&name) {
                    Ok(()) => info!("replaced obsolete credential manager override '{}'", name),
                    Err(e) => {
                        self.result.secrets_migrated = false;
                        self.exception(
                            "Failed to replace credential manager override setting.",
                            &e,
                        );
                    }
                }
            }
        }

        match self.obsolete_plugin_installed() {
            Ok(true) => {
                self.result.selected_backend_name = Some(OBSOLETE_SCS_PLUGIN_NAME.to_string());
            }
            Ok(false) => {}
            Err(e) => self.exception("Failed trying to get the set of installed plugins.", &e),
        }
    }

    fn obsolete_plugin_installed(&self) -> Result<bool, ConvertError> {
        let path = &self.env.paths.plugins_file;
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                let context = format!("Cannot read plugins file {}", path.display());
                return Err(ConvertError::io(context, e));
            }
        };
        let plugins: Value = serde_json::from_str(&content).map_err(|e| ConvertError::Parse {
            context: format!("Cannot read plugins file {}", path.display()),
            reason: e.to_string(),
        })?;
        Ok(plugins.get(OBSOLETE_SCS_PLUGIN_NAME).is_some())
    }

    fn init_cred_mgr(&mut self) {
        let factory = self.env.factory;
        if factory.is_initialized() {
            if self.old_override_configured {
                error!(
                    "A credential manager was already bound before the obsolete override was \
                     replaced. Legacy credentials cannot be migrated until the CLI is restarted."
                );
                self.result.restart_required = true;
            }
            return;
        }

        let bound = match self.opts.external_profile_reader {
            Some(reader) => reader.init_credentials(factory),
            None => overrides::load_overrides(factory, self.env.registry),
        };
        if let Err(e) = bound {
            self.result.secrets_migrated = false;
            self.exception("Failed to initialize the credential manager.", &e);
        }
    }

    fn move_profiles(&mut self) -> Result<(), ConvertError> {
        let root = self.env.paths.profiles.clone();
        let mut doc = ConfigDocument::default();
        let mut type_configs: Vec<ProfileTypeConfig> = Vec::new();

        for profile_type in legacy_read::profile_type_dirs(&root)? {
            let type_dir = root.join(&profile_type);
            let names = legacy_read::profile_names(&type_dir, &profile_type)?;
            if names.is_empty() {
                continue;
            }

            for name in names {
                match self.convert_profile(&type_dir, &profile_type, &name) {
                    Ok(node) => {
                        let key = legacy_read::profile_map_key(&profile_type, &name);
                        doc.profiles.insert(key, node.to_value());
                        self.result
                            .profiles_converted
                            .entry(profile_type.clone())
                            .or_default()
                            .push(name);
                    }
                    Err(e) => {
                        self.result.secrets_migrated = false;
                        self.exception(
                            &format!("Failed to read '{}' profile named '{}'", profile_type, name),
                            &e,
                        );
                        self.result.profiles_failed.push(ProfileFailure {
                            name: Some(name),
                            profile_type: profile_type.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            match legacy_read::read_meta_file(&legacy_read::meta_file(&type_dir, &profile_type)) {
                Ok(meta) => {
                    if let Some(default) = meta.default_profile {
                        doc.defaults.insert(
                            profile_type.clone(),
                            Value::String(legacy_read::profile_map_key(&profile_type, &default)),
                        );
                    }
                    if let Some(configuration) = meta.configuration {
                        type_configs.push(configuration);
                    }
                }
                Err(e) => {
                    let intro = format!("Failed to find default '{}' profile.", profile_type);
                    self.exception(&intro, &e);
                    self.result.profiles_failed.push(ProfileFailure {
                        name: None,
                        profile_type: profile_type.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        rename_properties(&mut doc);
        doc.auto_store = Some(true);

        let converted: Vec<String> = self
            .result
            .profiles_converted
            .iter()
            .map(|(t, names)| format!("Converted {} profiles: {}", t, names.join(", ")))
            .collect();
        for line in converted {
            self.report(line);
        }
        if !self.result.profiles_failed.is_empty() {
            let failed = self.result.profiles_failed.len();
            let msg = format!("Unable to convert {} profile(s).", failed);
            self.push(MsgKind::Error, msg, true, false);
        }

        self.create_new_config(&doc, &type_configs)
    }

    fn convert_profile(
        &mut self,
        type_dir: &Path,
        profile_type: &str,
        name: &str,
    ) -> Result<ProfileNode, ConvertError> {
        let props = legacy_read::read_profile_file(&legacy_read::profile_file(type_dir, name))?;
        let mut properties = Map::new();
        let mut secure = Vec::new();

        for (key, value) in props {
            if !legacy_read::is_secure_marker(&value) {
                properties.insert(key, value);
                continue;
            }
            // a secret that cannot be resolved is dropped, never left as a marker
            if let Some(secret) = self.load_legacy_secret(profile_type, name, &key) {
                properties.insert(key.clone(), secret);
                secure.push(key);
            }
        }

        Ok(ProfileNode {
            profile_type: Some(profile_type.to_string()),
            properties,
            secure,
            profiles: Map::new(),
        })
    }

    fn load_legacy_secret(&mut self, profile_type: &str, name: &str, key: &str) -> Option<Value> {
        let account = legacy_read::profile_property_key(profile_type, name, key);
        let loaded = self
            .env
            .factory
            .manager()
            .and_then(|manager| manager.load(&account, true));
        match loaded {
            Ok(Some(raw)) => Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw))),
            Ok(None) => {
                warn!(
                    "no secure value stored for '{}' of {} profile '{}'",
                    key, profile_type, name
                );
                None
            }
            Err(e) => {
                warn!(
                    "cannot load secure value '{}' of {} profile '{}': {}",
                    key, profile_type, name, e
                );
                self.result.secrets_migrated = false;
                None
            }
        }
    }

    fn create_new_config(
        &mut self,
        doc: &ConfigDocument,
        type_configs: &[ProfileTypeConfig],
    ) -> Result<(), ConvertError> {
        let manager = self.env.factory.manager().ok();
        if manager.is_some() || self.config.secure().has_vault() {
            // the blob is shared with every other layer; saving from an
            // empty cache would drop their secrets
            if let Err(e) = self.config.load_secure(manager) {
                self.result.secrets_migrated = false;
                self.exception(
                    "Failed to load existing secure properties. \
                     The new configuration was not saved.",
                    &e,
                );
                return Ok(());
            }
        }

        self.config.activate(false, true);
        self.config.merge(doc);
        schema::update_schema(self.config, type_configs)?;
        self.config.save(false)?;
        let new_path = self.config.layer_active().path.clone();
        self.result.new_config_path = Some(new_path.clone());

        let aside = self.env.paths.profiles_aside.clone();
        match fs::rename(&self.env.paths.profiles, &aside) {
            Ok(()) => {
                if !self.opts.delete_legacy_profiles {
                    self.report_paragraph(format!(
                        "Your old legacy profiles have been moved to {}. \
                         Delete them by re-running this operation and requesting deletion.",
                        aside.display()
                    ));
                }
            }
            Err(e) => {
                let e = ConvertError::io("rename", e);
                self.exception(
                    &format!("Failed to rename profiles directory to {}:", aside.display()),
                    &e,
                );
            }
        }

        self.report_paragraph(format!(
            "Your new profiles have been saved to {}. \
             To change your configuration, update that file in your text editor.",
            new_path.display()
        ));
        Ok(())
    }

    fn delete_legacy(&mut self) {
        let aside = self.env.paths.profiles_aside.clone();
        // collected first: the OS keychain cannot list its entries
        let candidates = legacy_read::secure_accounts(&aside);

        if aside.exists() {
            match fs::remove_dir_all(&aside) {
                Ok(()) => self.report_paragraph(format!(
                    "Deleted the old profiles directory {}.",
                    aside.display()
                )),
                Err(e) => self.exception(
                    &format!("Failed to delete the profiles directory {}", aside.display()),
                    &ConvertError::io("remove", e),
                ),
            }
        } else {
            self.report_paragraph(format!(
                "The old profiles directory {} did not exist.",
                aside.display()
            ));
        }

        let store = Arc::clone(&self.env.secret_store);
        if let Err(e) = store.probe() {
            self.exception(
                "The credential vault is unavailable. Unable to delete old secure values.",
                &e,
            );
            return;
        }

        let mut first = true;
        for service in sweep_services() {
            for account in self.find_old_secure_props(store.as_ref(), service, &candidates) {
                if account.contains(SECURE_ACCOUNT) {
                    continue;
                }
                let deleted = match store.delete(service, &account) {
                    Ok(deleted) => deleted,
                    Err(e) => {
                        self.exception(
                            &format!(
                                "Encountered an error while deleting secure data for \
                                 service '{}/{}':",
                                service, account
                            ),
                            &e,
                        );
                        false
                    }
                };
                let kind = if deleted { MsgKind::Report } else { MsgKind::Error };
                let verb = if deleted { "Deleted" } else { "Failed to delete" };
                self.push(
                    kind,
                    format!("{} obsolete secure value {}/{}.", verb, service, account),
                    first,
                    false,
                );
                // only the first delete message opens a paragraph
                first = false;
            }
        }
    }

    /// Legacy accounts present under `service`: the store's own listing when
    /// it has one, otherwise those of `candidates` that resolve.
    fn find_old_secure_props(
        &mut self,
        store: &dyn SecretStore,
        service: &str,
        candidates: &[String],
    ) -> Vec<String> {
        match store.accounts(service) {
            Some(Ok(accounts)) => accounts,
            Some(Err(e)) => {
                self.result.secrets_migrated = false;
                self.exception(
                    &format!(
                        "Encountered an error while gathering secure properties for service '{}':",
                        service
                    ),
                    &e,
                );
                Vec::new()
            }
            None => candidates
                .iter()
                .filter(|account| match store.get(service, account) {
                    Ok(found) => found.is_some(),
                    Err(e) => {
                        warn!("cannot probe {}/{}: {}", service, account, e);
                        false
                    }
                })
                .cloned()
                .collect(),
        }
    }

    fn push(&mut self, kind: MsgKind, text: String, paragraph: bool, indent: bool) {
        if kind == MsgKind::Error {
            error!("{}", text);
        }
        self.result.messages.push(ConvertMsg {
            kind,
            text,
            paragraph,
            indent,
        });
    }

    fn report(&mut self, text: String) {
        self.push(MsgKind::Report, text, false, false);
    }

    fn report_paragraph(&mut self, text: String) {
        self.push(MsgKind::Report, text, true, false);
    }

    fn exception(&mut self, intro: &str, err: &dyn std::error::Error) {
        self.push(MsgKind::Error, intro.to_string(), true, false);
        self.push(MsgKind::Error, format!("Reason: {}", err), false, true);
    }
}

/// Every service name legacy releases stored secrets under.
fn sweep_services() -> Vec<&'static str> {
    let mut services: Vec<&'static str> = LEGACY_SERVICE_NAMES.to_vec();
    if !services.contains(&DEFAULT_SERVICE_NAME) {
        services.push(DEFAULT_SERVICE_NAME);
    }
    services
}

/// Apply [`RENAMED_PROPERTIES`] to property names and to `secure` lists.
fn rename_properties(doc: &mut ConfigDocument) {
    let renamed = |name: &str| -> Option<&'static str> {
        RENAMED_PROPERTIES
            .iter()
            .find(|(old, _)| *old == name)
            .map(|(_, new)| *new)
    };

    for profile in doc.profiles.values_mut() {
        if let Some(Value::Object(props)) = profile.get_mut("properties") {
            let mut out = Map::new();
            let mut moved = Vec::new();
            for (k, v) in std::mem::take(props) {
                match renamed(&k) {
                    Some(new) => moved.push((new.to_string(), v)),
                    None => {
                        out.insert(k, v);
                    }
                }
            }
            // renamed properties land after the untouched ones
            for (k, v) in moved {
                out.insert(k, v);
            }
            *props = out;
        }
        if let Some(Value::Array(secure)) = profile.get_mut("secure") {
            for entry in secure.iter_mut() {
                if let Some(new) = entry.as_str().and_then(renamed) {
                    *entry = Value::String(new.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rename_properties_in_values_and_secure_list() {
        let mut doc = ConfigDocument::default();
        doc.profiles.insert(
            "zosmf_lpar1".into(),
            json!({
                "type": "zosmf",
                "properties": {"hostname": "h", "port": 1, "username": "u", "pass": "p"},
                "secure": ["username", "pass"]
            }),
        );
        rename_properties(&mut doc);
        let profile = &doc.profiles["zosmf_lpar1"];
        let keys: Vec<&String> = profile["properties"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["port", "host", "user", "password"]);
        assert_eq!(profile["properties"]["host"], "h");
        assert_eq!(profile["secure"], json!(["user", "password"]));
    }

    #[test]
    fn test_sweep_services_cover_default_and_legacy() {
        let services = sweep_services();
        assert!(services.contains(&DEFAULT_SERVICE_NAME));
        for legacy in LEGACY_SERVICE_NAMES {
            assert!(services.contains(legacy));
        }
    }
}
