use credlayer::constants::{DEFAULT_SERVICE_NAME, SECURE_ACCOUNT};
use credlayer::core::config::Config;
use credlayer::core::convert::{convert, ConvertEnv, ConvertOptions, ExternalProfileReader};
use credlayer::core::default_vault::DefaultVault;
use credlayer::core::factory::{
    BackendCtor, BackendParams, BackendRef, BindingFactory, InitParams,
};
use credlayer::core::os_store::MemoryStore;
use credlayer::core::paths::CliPaths;
use credlayer::core::registry::Registry;
use credlayer::core::vault::{CredentialVault, SecretStore};
use credlayer::error::VaultError;
use credlayer::models::backend::SelectedBackend;
use credlayer::models::conversion::{ConversionResult, MsgKind};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const META: &str = "defaultProfile: apple
configuration:
  type: fruit
  schema:
    type: object
    title: Fruit profile
    properties:
      color:
        type: string
        optionDefinition:
          description: Color of the fruit
      secret:
        type: string
        secure: true
";

/// Wraps a [`MemoryStore`] to behave like an OS keychain: optionally
/// without a listing, and optionally failing every delete under one service.
struct ScriptedStore {
    inner: MemoryStore,
    listable: bool,
    fail_delete_service: Option<&'static str>,
}

impl SecretStore for ScriptedStore {
    fn get(&self, service: &str, account: &str) -> Result<Option<String>, VaultError> {
        self.inner.get(service, account)
    }

    fn set(&self, service: &str, account: &str, value: &str) -> Result<(), VaultError> {
        self.inner.set(service, account, value)
    }

    fn delete(&self, service: &str, account: &str) -> Result<bool, VaultError> {
        if self.fail_delete_service == Some(service) {
            return Err(VaultError::store(service, account, "access denied"));
        }
        self.inner.delete(service, account)
    }

    fn accounts(&self, service: &str) -> Option<Result<Vec<String>, VaultError>> {
        if self.listable {
            self.inner.accounts(service)
        } else {
            None
        }
    }
}

/// Binds the built-in manager over a shared in-memory store.
struct MemoryHost {
    store: MemoryStore,
}

impl ExternalProfileReader for MemoryHost {
    fn init_credentials(&self, factory: &BindingFactory) -> Result<(), VaultError> {
        factory.initialize(InitParams {
            backend: BackendRef::Constructor(memory_ctor(self.store.clone())),
            service: Some(DEFAULT_SERVICE_NAME.to_string()),
            ..Default::default()
        })
    }
}

struct BrokenHost;

impl ExternalProfileReader for BrokenHost {
    fn init_credentials(&self, _factory: &BindingFactory) -> Result<(), VaultError> {
        Err(VaultError::BackendUnavailable {
            name: "Host Vault".to_string(),
            reason: "keychain locked".to_string(),
        })
    }
}

fn memory_ctor(store: MemoryStore) -> BackendCtor {
    Arc::new(move |p: &BackendParams| {
        let vault = DefaultVault::with_store(&p.service, &p.display_name, Arc::new(store.clone()));
        Ok(Box::new(vault) as Box<dyn CredentialVault>)
    })
}

struct Fixture {
    home: TempDir,
    paths: CliPaths,
    store: MemoryStore,
    factory: BindingFactory,
    registry: Registry,
}

impl Fixture {
    fn new() -> Self {
        let home = TempDir::new().unwrap();
        let paths = CliPaths::from_home(home.path().to_path_buf());
        let registry = Registry::new(home.path());
        Self {
            home,
            paths,
            store: MemoryStore::new(),
            factory: BindingFactory::new(),
            registry,
        }
    }

    /// Bind the built-in manager over the in-memory store.
    fn bind_memory(&self) {
        self.factory
            .initialize(InitParams {
                backend: BackendRef::Constructor(memory_ctor(self.store.clone())),
                service: Some(DEFAULT_SERVICE_NAME.to_string()),
                ..Default::default()
            })
            .unwrap();
    }

    /// A store sharing cells with `self.store`.
    fn scripted(&self, listable: bool, fail_delete_service: Option<&'static str>) -> ScriptedStore {
        ScriptedStore {
            inner: self.store.clone(),
            listable,
            fail_delete_service,
        }
    }

    fn write_plugins(&self, content: &str) {
        fs::create_dir_all(self.paths.plugins_file.parent().unwrap()).unwrap();
        fs::write(&self.paths.plugins_file, content).unwrap();
    }

    fn write_profile(&self, profile_type: &str, name: &str, content: &str) {
        let dir = self.home.path().join("profiles").join(profile_type);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.yaml", name)), content).unwrap();
    }

    fn write_fruit(&self) {
        self.write_profile("fruit", "fruit_meta", META);
        self.write_profile("fruit", "apple", "color: red\nhostname: orchard\n");
        self.write_profile("fruit", "banana", "color: yellow\n");
        self.write_profile("fruit", "coconut", "color: brown\n");
    }

    fn write_settings(&self, content: &str) {
        let path = self.registry.settings_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn run(&self, delete: bool) -> ConversionResult {
        let opts = ConvertOptions {
            delete_legacy_profiles: delete,
            ..Default::default()
        };
        self.run_with(&opts, Arc::new(self.store.clone()))
    }

    fn run_with(&self, opts: &ConvertOptions<'_>, store: Arc<dyn SecretStore>) -> ConversionResult {
        let mut config = Config::load(self.home.path(), None).unwrap();
        let env = ConvertEnv {
            paths: &self.paths,
            factory: &self.factory,
            registry: &self.registry,
            secret_store: store,
        };
        convert(&env, &mut config, opts)
    }

    fn config_path(&self) -> std::path::PathBuf {
        self.home.path().join("credlayer.config.json")
    }

    fn read_config(&self) -> Value {
        read_json(&self.config_path())
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn texts(result: &ConversionResult, kind: MsgKind) -> Vec<String> {
    result
        .messages
        .iter()
        .filter(|m| m.kind == kind)
        .map(|m| m.text.clone())
        .collect()
}

#[test]
fn converts_a_profile_type_with_default_and_schema() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();

    let result = fx.run(false);

    assert!(!result.has_errors(), "{:?}", result.messages);
    assert_eq!(result.profiles_found, 3);
    assert_eq!(result.profiles_converted["fruit"], vec!["apple", "banana", "coconut"]);
    assert_eq!(result.new_config_path.as_deref(), Some(fx.config_path().as_path()));
    assert!(texts(&result, MsgKind::Report)
        .contains(&"Converted fruit profiles: apple, banana, coconut".to_string()));

    let doc = fx.read_config();
    assert_eq!(doc["$schema"], "./credlayer.schema.json");
    assert_eq!(doc["defaults"]["fruit"], "fruit_apple");
    assert_eq!(doc["autoStore"], true);
    assert_eq!(doc["profiles"]["fruit_apple"]["type"], "fruit");
    assert_eq!(doc["profiles"]["fruit_apple"]["properties"]["color"], "red");
    assert_eq!(doc["profiles"]["fruit_apple"]["properties"]["host"], "orchard");
    assert!(doc["profiles"]["fruit_apple"]["properties"].get("hostname").is_none());

    let schema = read_json(&fx.home.path().join("credlayer.schema.json"));
    let pattern = &schema["properties"]["profiles"]["patternProperties"]["^\\S*$"];
    assert!(pattern["allOf"].is_array());

    assert!(!fx.home.path().join("profiles").exists());
    assert!(fx.home.path().join("profiles-old/fruit/apple.yaml").exists());
}

#[test]
fn unreadable_profile_is_reported_and_others_convert() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();
    fx.write_profile("fruit", "banana", "a: [unclosed");

    let result = fx.run(false);

    assert_eq!(result.profiles_converted["fruit"], vec!["apple", "coconut"]);
    assert_eq!(result.profiles_failed.len(), 1);
    assert_eq!(result.profiles_failed[0].name.as_deref(), Some("banana"));
    assert!(!result.secrets_migrated);

    let errors = texts(&result, MsgKind::Error);
    assert!(errors.contains(&"Failed to read 'fruit' profile named 'banana'".to_string()));
    assert!(errors.contains(&"Unable to convert 1 profile(s).".to_string()));

    let doc = fx.read_config();
    assert!(doc["profiles"].get("fruit_banana").is_none());
    assert!(doc["profiles"].get("fruit_coconut").is_some());
}

#[test]
fn secure_marker_moves_secret_into_the_vault() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "color: red\nsecret: managed by @credlayer/cli\n");
    fx.store
        .set("@credlayer/cli", "fruit_apple_secret", "\"shh\"")
        .unwrap();

    let result = fx.run(false);
    assert!(result.secrets_migrated);

    let doc = fx.read_config();
    let apple = &doc["profiles"]["fruit_apple"];
    assert!(apple["properties"].get("secret").is_none());
    assert_eq!(apple["secure"], json!(["secret"]));
    assert!(!fs::read_to_string(fx.config_path()).unwrap().contains("shh"));

    let blob = fx.store.get(DEFAULT_SERVICE_NAME, SECURE_ACCOUNT).unwrap().unwrap();
    let blob: Value = serde_json::from_str(&blob).unwrap();
    let key = fx.config_path().to_string_lossy().into_owned();
    assert_eq!(blob[key.as_str()]["profiles.fruit_apple.properties.secret"], "shh");

    // reloading splices the secret back in
    let mut config = Config::load(fx.home.path(), None).unwrap();
    config.load_secure(Some(fx.factory.manager().unwrap())).unwrap();
    assert_eq!(
        config.layer_active().properties["profiles"]["fruit_apple"]["properties"]["secret"],
        "shh"
    );
}

#[test]
fn missing_legacy_secret_is_dropped() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by @credlayer/cli\n");

    let result = fx.run(false);

    assert_eq!(result.profiles_converted["fruit"], vec!["apple"]);
    assert!(result.secrets_migrated);
    let doc = fx.read_config();
    assert!(doc["profiles"]["fruit_apple"]["properties"].get("secret").is_none());
    assert_eq!(doc["profiles"]["fruit_apple"]["secure"], json!([]));
}

#[test]
fn second_run_converts_nothing() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();
    fx.run(false);
    let before = fs::read(fx.config_path()).unwrap();

    let result = fx.run(false);

    assert_eq!(result.profiles_found, 0);
    assert_eq!(result.converted_count(), 0);
    let reports = texts(&result, MsgKind::Report);
    assert!(reports[0].starts_with(
        "Did not convert any legacy profiles because a current configuration was found"
    ));
    assert_eq!(fs::read(fx.config_path()).unwrap(), before);
}

#[test]
fn no_legacy_profiles_is_reported() {
    let fx = Fixture::new();
    fx.bind_memory();

    let result = fx.run(false);

    assert!(!result.has_errors());
    assert!(texts(&result, MsgKind::Report)[0]
        .starts_with("Did not convert any legacy profiles because no legacy profiles were found"));
    assert!(!fx.config_path().exists());
}

#[test]
fn delete_removes_old_tree_and_sweeps_legacy_secrets() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by @credlayer/cli\n");
    fx.store
        .set("@credlayer/cli", "fruit_apple_secret", "\"shh\"")
        .unwrap();

    let result = fx.run(true);

    assert!(!fx.home.path().join("profiles-old").exists());
    assert!(fx
        .store
        .get("@credlayer/cli", "fruit_apple_secret")
        .unwrap()
        .is_none());
    // the new blob survives the sweep
    assert!(fx.store.get(DEFAULT_SERVICE_NAME, SECURE_ACCOUNT).unwrap().is_some());

    let reports = texts(&result, MsgKind::Report);
    assert!(reports
        .iter()
        .any(|m| m.starts_with("Deleted the old profiles directory")));
    assert!(reports
        .contains(&"Deleted obsolete secure value @credlayer/cli/fruit_apple_secret.".to_string()));
    assert!(!reports.iter().any(|m| m.starts_with("Your old legacy profiles have been moved")));
}

#[test]
fn delete_without_old_tree_still_sweeps() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.store.set("Credlayer-Plugin", "fruit_pear_secret", "x").unwrap();

    let result = fx.run(true);

    assert!(texts(&result, MsgKind::Report)
        .iter()
        .any(|m| m.starts_with("The old profiles directory") && m.ends_with("did not exist.")));
    assert!(fx.store.get("Credlayer-Plugin", "fruit_pear_secret").unwrap().is_none());
}

#[test]
fn obsolete_override_is_replaced_and_restart_flagged() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();
    fx.write_settings(
        r#"{"overrides":{"CredentialManager":"@credlayer/secure-credential-store"}}"#,
    );
    fx.write_plugins(r#"{"@credlayer/secure-credential-store":{"version":"4.1.0"}}"#);

    let result = fx.run(false);

    assert!(result.restart_required);
    assert_eq!(fx.registry.current(), SelectedBackend::default_backend());
    assert_eq!(
        result.selected_backend_name.as_deref(),
        Some("@credlayer/secure-credential-store")
    );
    let last = result.messages.last().unwrap();
    assert!(last.text.starts_with(
        "The obsolete plug-in @credlayer/secure-credential-store will be uninstalled"
    ));
}

#[test]
fn unbound_factory_binds_the_selected_backend() {
    let fx = Fixture::new();
    fx.write_settings(r#"{"overrides":{"CredentialManager":"Secrets for Kubernetes"}}"#);
    let ctor = memory_ctor(fx.store.clone());
    fx.factory
        .register_backend("Secrets for Kubernetes", move |p: &BackendParams| ctor(p))
        .unwrap();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by Secrets for Kubernetes\n");
    fx.store
        .set(DEFAULT_SERVICE_NAME, "fruit_apple_secret", "plain")
        .unwrap();

    let result = fx.run(false);

    assert!(fx.factory.is_initialized());
    assert!(!result.restart_required);
    assert!(result.secrets_migrated);
    let mut config = Config::load(fx.home.path(), None).unwrap();
    config.load_secure(Some(fx.factory.manager().unwrap())).unwrap();
    assert_eq!(
        config.layer_active().properties["profiles"]["fruit_apple"]["properties"]["secret"],
        "plain"
    );
}

#[test]
fn secrets_of_other_layers_survive_conversion() {
    let fx = Fixture::new();
    fx.bind_memory();
    let project = TempDir::new().unwrap();
    let mut project_config = Config::load(fx.home.path(), Some(project.path())).unwrap();
    project_config.set_vault(fx.factory.manager().unwrap());
    project_config.activate(false, false);
    project_config.set("profiles.lpar.properties.password", json!("projsecret"), true);
    project_config.save(false).unwrap();
    let project_key = project_config
        .layer_active()
        .path
        .to_string_lossy()
        .into_owned();

    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by @credlayer/cli\n");
    fx.store
        .set("@credlayer/cli", "fruit_apple_secret", "\"shh\"")
        .unwrap();

    let result = fx.run(false);

    assert!(!result.has_errors(), "{:?}", result.messages);
    let blob = fx.store.get(DEFAULT_SERVICE_NAME, SECURE_ACCOUNT).unwrap().unwrap();
    let blob: Value = serde_json::from_str(&blob).unwrap();
    assert_eq!(
        blob[project_key.as_str()]["profiles.lpar.properties.password"],
        "projsecret"
    );
    let home_key = fx.config_path().to_string_lossy().into_owned();
    assert_eq!(blob[home_key.as_str()]["profiles.fruit_apple.properties.secret"], "shh");
}

#[test]
fn unreadable_secure_blob_stops_before_saving() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();
    fx.store.set(DEFAULT_SERVICE_NAME, SECURE_ACCOUNT, "not json").unwrap();

    let result = fx.run(false);

    assert!(!result.secrets_migrated);
    assert!(texts(&result, MsgKind::Error).contains(
        &"Failed to load existing secure properties. The new configuration was not saved."
            .to_string()
    ));
    assert!(!fx.config_path().exists());
    assert!(fx.paths.profiles.is_dir());
    assert_eq!(
        fx.store.get(DEFAULT_SERVICE_NAME, SECURE_ACCOUNT).unwrap().as_deref(),
        Some("not json")
    );
}

#[test]
fn sweep_without_listing_uses_marker_accounts() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by @credlayer/cli\n");
    fx.store
        .set("@credlayer/cli", "fruit_apple_secret", "\"shh\"")
        .unwrap();
    fx.store
        .set("Credlayer-Plugin", "fruit_apple_secret", "\"shh\"")
        .unwrap();
    fx.store.set("@credlayer/cli", "other_account", "keep").unwrap();

    let opts = ConvertOptions {
        delete_legacy_profiles: true,
        ..Default::default()
    };
    let result = fx.run_with(&opts, Arc::new(fx.scripted(false, None)));

    assert!(!result.has_errors(), "{:?}", result.messages);
    for service in ["@credlayer/cli", "Credlayer-Plugin"] {
        assert!(fx.store.get(service, "fruit_apple_secret").unwrap().is_none());
    }
    assert_eq!(
        fx.store.get("@credlayer/cli", "other_account").unwrap().as_deref(),
        Some("keep")
    );
    let reports = texts(&result, MsgKind::Report);
    for service in ["@credlayer/cli", "Credlayer-Plugin"] {
        let line = format!("Deleted obsolete secure value {}/fruit_apple_secret.", service);
        assert!(reports.contains(&line), "{:?}", reports);
    }
}

#[test]
fn failed_secret_delete_is_reported_and_sweep_continues() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.store.set("@credlayer/core", "a_secret", "x").unwrap();
    fx.store.set("@credlayer/cli", "b_secret", "y").unwrap();

    let opts = ConvertOptions {
        delete_legacy_profiles: true,
        ..Default::default()
    };
    let result = fx.run_with(&opts, Arc::new(fx.scripted(true, Some("@credlayer/core"))));

    let errors = texts(&result, MsgKind::Error);
    assert!(errors.contains(
        &"Encountered an error while deleting secure data for service '@credlayer/core/a_secret':"
            .to_string()
    ));
    assert!(errors
        .contains(&"Failed to delete obsolete secure value @credlayer/core/a_secret.".to_string()));
    assert!(texts(&result, MsgKind::Report)
        .contains(&"Deleted obsolete secure value @credlayer/cli/b_secret.".to_string()));
    assert!(fx.store.get("@credlayer/core", "a_secret").unwrap().is_some());
    assert!(fx.store.get("@credlayer/cli", "b_secret").unwrap().is_none());
}

#[test]
fn rename_failure_keeps_new_config_and_legacy_tree() {
    let fx = Fixture::new();
    fx.bind_memory();
    fx.write_fruit();
    fs::create_dir_all(&fx.paths.profiles_aside).unwrap();
    fs::write(fx.paths.profiles_aside.join("leftover.txt"), "x").unwrap();

    let result = fx.run(false);

    let errors = texts(&result, MsgKind::Error);
    assert!(errors
        .iter()
        .any(|m| m.starts_with("Failed to rename profiles directory to")));
    assert!(fx.config_path().exists());
    assert!(fx.paths.profiles.join("fruit/apple.yaml").exists());
    assert!(!texts(&result, MsgKind::Report)
        .iter()
        .any(|m| m.starts_with("Your old legacy profiles have been moved")));
}

#[test]
fn unreadable_legacy_root_stops_before_converting() {
    let fx = Fixture::new();
    fx.bind_memory();
    fs::write(&fx.paths.profiles, "not a directory").unwrap();

    let result = fx.run(false);

    assert_eq!(result.profiles_found, 0);
    let expected = format!(
        "Failed to get legacy profiles in {}.",
        fx.paths.profiles.display()
    );
    assert!(texts(&result, MsgKind::Error).contains(&expected));
    assert!(!fx.config_path().exists());
}

#[test]
fn relocated_paths_are_honored() {
    let mut fx = Fixture::new();
    fx.bind_memory();
    let elsewhere = TempDir::new().unwrap();
    fx.paths.profiles = elsewhere.path().join("legacy");
    fx.paths.profiles_aside = elsewhere.path().join("legacy-done");
    let dir = fx.paths.profiles.join("fruit");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("fruit_meta.yaml"), META).unwrap();
    fs::write(dir.join("apple.yaml"), "color: red\n").unwrap();

    let result = fx.run(false);

    assert_eq!(result.profiles_converted["fruit"], vec!["apple"]);
    assert!(!fx.paths.profiles.exists());
    assert!(fx.paths.profiles_aside.join("fruit/apple.yaml").exists());
    assert!(!fx.home.path().join("profiles-old").exists());
}

#[test]
fn host_reader_that_cannot_bind_is_reported() {
    let fx = Fixture::new();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "color: red\nsecret: managed by @credlayer/cli\n");
    fx.write_plugins(r#"{"@credlayer/secure-credential-store":{"version":"4.1.0"}}"#);

    let opts = ConvertOptions {
        external_profile_reader: Some(&BrokenHost),
        ..Default::default()
    };
    let result = fx.run_with(&opts, Arc::new(fx.store.clone()));

    assert!(!result.secrets_migrated);
    assert!(!fx.factory.is_initialized());
    assert!(texts(&result, MsgKind::Error)
        .contains(&"Failed to initialize the credential manager.".to_string()));
    let last = &result.messages.last().unwrap().text;
    assert!(last.starts_with(
        "The obsolete plug-in @credlayer/secure-credential-store should be uninstalled"
    ));
    assert!(last.contains("credlayer plugins uninstall @credlayer/secure-credential-store"));
}

#[test]
fn host_reader_binds_the_manager_and_secrets_migrate() {
    let fx = Fixture::new();
    fx.write_profile("fruit", "fruit_meta", META);
    fx.write_profile("fruit", "apple", "secret: managed by @credlayer/cli\n");
    fx.store
        .set("@credlayer/cli", "fruit_apple_secret", "\"shh\"")
        .unwrap();
    let host = MemoryHost {
        store: fx.store.clone(),
    };

    let opts = ConvertOptions {
        external_profile_reader: Some(&host),
        ..Default::default()
    };
    let result = fx.run_with(&opts, Arc::new(fx.store.clone()));

    assert!(result.secrets_migrated, "{:?}", result.messages);
    assert!(!result.has_errors());
    assert!(fx.factory.is_initialized());
    assert!(result.selected_backend_name.is_none());
    let mut config = Config::load(fx.home.path(), None).unwrap();
    config.load_secure(Some(fx.factory.manager().unwrap())).unwrap();
    assert_eq!(
        config.layer_active().properties["profiles"]["fruit_apple"]["properties"]["secret"],
        "shh"
    );
}
