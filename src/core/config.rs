//! Layered configuration.
//!
//! Up to four JSON layers are consulted, highest priority first:
//! project user, project, global user, global. Global layers live in the CLI
//! home; project layers only exist when a project directory is given. One
//! layer is active at a time and receives merges and property updates.

use crate::constants::{APP_NAME, SETTINGS_FILE_MODE};
use crate::core::file_lock::FileLock;
use crate::core::secure::{self, SecureStore};
use crate::core::vault::CredentialVault;
use crate::error::ConfigError;
use crate::models::config_doc::ConfigDocument;
use crate::util::fs as cl_fs;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    pub path: PathBuf,
    pub user: bool,
    pub global: bool,
    pub exists: bool,
    pub properties: Value,
}

impl ConfigLayer {
    fn read(path: PathBuf, user: bool, global: bool) -> Result<Self, ConfigError> {
        let read_err = |reason: String| ConfigError::Read {
            path: path.clone(),
            reason,
        };
        let (exists, properties) = match fs::read_to_string(&path) {
            Ok(content) => {
                let value: Value =
                    serde_json::from_str(&content).map_err(|e| read_err(e.to_string()))?;
                if !value.is_object() {
                    return Err(read_err("expected a JSON object".to_string()));
                }
                (true, value)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (false, empty_properties()),
            Err(e) => return Err(read_err(e.to_string())),
        };
        Ok(Self {
            path,
            user,
            global,
            exists,
            properties,
        })
    }
}

fn empty_properties() -> Value {
    json!({"profiles": {}, "defaults": {}})
}

/// `<app>.config.json` or `<app>.config.user.json`
pub fn layer_file_name(app: &str, user: bool) -> String {
    if user {
        format!("{}.config.user.json", app)
    } else {
        format!("{}.config.json", app)
    }
}

pub struct Config {
    layers: Vec<ConfigLayer>,
    active: (bool, bool),
    secure: SecureStore,
}

impl Config {
    /// Read every layer for `home` and, if given, `project_dir`. Missing
    /// files are fine; unreadable or malformed ones are not.
    pub fn load(home: &Path, project_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        if let Some(project) = project_dir {
            let user = project.join(layer_file_name(APP_NAME, true));
            let team = project.join(layer_file_name(APP_NAME, false));
            layers.push(ConfigLayer::read(user, true, false)?);
            layers.push(ConfigLayer::read(team, false, false)?);
        }
        layers.push(ConfigLayer::read(home.join(layer_file_name(APP_NAME, true)), true, true)?);
        layers.push(ConfigLayer::read(home.join(layer_file_name(APP_NAME, false)), false, true)?);

        let active = layers
            .iter()
            .find(|l| l.exists)
            .map(|l| (l.user, l.global))
            .unwrap_or((false, project_dir.is_none()));
        debug!(
            "config loaded: {} layer(s), {} existing",
            layers.len(),
            layers.iter().filter(|l| l.exists).count()
        );

        Ok(Self {
            layers,
            active,
            secure: SecureStore::new(),
        })
    }

    /// True if any layer file exists.
    pub fn exists(&self) -> bool {
        self.layers.iter().any(|l| l.exists)
    }

    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    pub fn find_layer(&self, user: bool, global: bool) -> Option<&ConfigLayer> {
        self.layers.iter().find(|l| l.user == user && l.global == global)
    }

    pub fn layer_active(&self) -> &ConfigLayer {
        let (user, global) = self.active;
        // `active` is only ever set to a pair present in `layers`
        self.find_layer(user, global)
            .unwrap_or_else(|| &self.layers[self.layers.len() - 1])
    }

    fn layer_active_mut(&mut self) -> &mut ConfigLayer {
        let (user, global) = self.active;
        let idx = self
            .layers
            .iter()
            .position(|l| l.user == user && l.global == global)
            .unwrap_or(self.layers.len() - 1);
        &mut self.layers[idx]
    }

    /// Make the `(user, global)` layer active. Ignored if no such layer.
    pub fn activate(&mut self, user: bool, global: bool) {
        if self.find_layer(user, global).is_some() {
            self.active = (user, global);
        }
    }

    /// Deep-merge `doc` into the active layer. Objects merge key by key,
    /// arrays gain the missing elements, other values are replaced.
    pub fn merge(&mut self, doc: &ConfigDocument) {
        let incoming = doc.to_value();
        merge_values(&mut self.layer_active_mut().properties, &incoming);
    }

    /// Set a property in the active layer. With `secure`, the property name
    /// is also recorded in the owning profile's `secure` array.
    pub fn set(&mut self, property_path: &str, value: Value, secure: bool) {
        let layer = self.layer_active_mut();
        secure::set_path(&mut layer.properties, property_path, value);
        if !secure {
            return;
        }
        if let Some(info) = secure::secure_info_for_prop(property_path, Some(&layer.properties)) {
            let prop = Value::String(info.prop);
            match secure::get_path(&layer.properties, &info.path).and_then(Value::as_array) {
                Some(list) if list.contains(&prop) => {}
                Some(list) => {
                    let mut list = list.clone();
                    list.push(prop);
                    secure::set_path(&mut layer.properties, &info.path, Value::Array(list));
                }
                None => {
                    secure::set_path(&mut layer.properties, &info.path, Value::Array(vec![prop]))
                }
            }
        }
    }

    pub fn set_schema_ref(&mut self, reference: &str) {
        let layer = self.layer_active_mut();
        if let Value::Object(map) = &mut layer.properties {
            // `$schema` leads the document
            let mut reordered = Map::new();
            reordered.insert("$schema".to_string(), Value::String(reference.to_string()));
            for (k, v) in std::mem::take(map) {
                if k != "$schema" {
                    reordered.insert(k, v);
                }
            }
            *map = reordered;
        }
    }

    pub fn secure(&self) -> &SecureStore {
        &self.secure
    }

    pub fn secure_mut(&mut self) -> &mut SecureStore {
        &mut self.secure
    }

    pub fn set_vault(&mut self, vault: Arc<dyn CredentialVault>) {
        self.secure.set_vault(vault);
    }

    /// Load secure values for every layer. `vault`, when given, becomes the
    /// manager used by later saves.
    pub fn load_secure(
        &mut self,
        vault: Option<Arc<dyn CredentialVault>>,
    ) -> Result<(), ConfigError> {
        self.secure.load(vault, &mut self.layers)
    }

    /// Secure property paths of the active layer.
    pub fn secure_fields(&self) -> Vec<String> {
        secure::secure_paths(&self.layer_active().properties)
    }

    pub fn secure_props_for_profile(&self, name: &str) -> Vec<String> {
        secure::secure_props_for_profile(&self.secure_fields(), name)
    }

    /// Persist secure values, then write the active layer (or, with
    /// `all_layers`, every existing layer) without them.
    pub fn save(&mut self, all_layers: bool) -> Result<(), ConfigError> {
        let active = self.active;
        let targets: Vec<usize> = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| (l.user, l.global) == active || (all_layers && l.exists))
            .map(|(i, _)| i)
            .collect();

        let selected: Vec<&ConfigLayer> = targets.iter().map(|&i| &self.layers[i]).collect();
        self.secure.save(&selected)?;

        for &i in &targets {
            let paths = secure::secure_paths(&self.layers[i].properties);
            let (stripped, _) = secure::extract_secrets(&self.layers[i].properties, &paths);
            let path = self.layers[i].path.clone();
            write_layer(&path, &stripped)?;
            self.layers[i].exists = true;
            info!("saved config layer {}", path.display());
        }
        Ok(())
    }
}

fn write_layer(path: &Path, properties: &Value) -> Result<(), ConfigError> {
    let write_err = |e: std::io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    let _lock = FileLock::guard(path).map_err(write_err)?;
    cl_fs::write_json_atomic(path, properties, SETTINGS_FILE_MODE).map_err(write_err)
}

fn merge_values(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(dst), Value::Object(src)) => {
            for (k, v) in src {
                match dst.get_mut(k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        dst.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (Value::Array(dst), Value::Array(src)) => {
            for v in src {
                if !dst.contains(v) {
                    dst.push(v.clone());
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}
