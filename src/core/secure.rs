//! Secure properties of configuration layers.
//!
//! A profile lists the names of its secret properties in its own `secure`
//! array. Those values are never written to the layer file. Instead they are
//! cached per layer path and persisted through the bound credential manager
//! as one JSON blob under [`SECURE_ACCOUNT`]:
//!
//! ```text
//! { "/home/u/.credlayer/credlayer.config.json": {
//!     "profiles.lpar1.properties.password": "..." } }
//! ```

use crate::constants::SECURE_ACCOUNT;
use crate::core::config::ConfigLayer;
use crate::core::vault::CredentialVault;
use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Layer path -> (secure path -> value).
pub type SecureCache = BTreeMap<String, BTreeMap<String, Value>>;

/// Where a property's name must be listed to make it secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureInfo {
    /// Dotted path of the `secure` array.
    pub path: String,
    /// Property name to list in that array.
    pub prop: String,
}

/// Dotted paths of every secure property under a `profiles` object, in
/// profile key order, nested profiles after their parent's own entries.
pub fn find_secure(profiles: &Map<String, Value>, prefix: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for (name, profile) in profiles {
        if let Some(secure) = profile.get("secure").and_then(Value::as_array) {
            for prop in secure.iter().filter_map(Value::as_str) {
                paths.push(format!("{}.{}.properties.{}", prefix, name, prop));
            }
        }
        if let Some(children) = profile.get("profiles").and_then(Value::as_object) {
            paths.extend(find_secure(children, &format!("{}.{}.profiles", prefix, name)));
        }
    }
    paths
}

/// Secure paths declared by a whole layer document.
pub fn secure_paths(properties: &Value) -> Vec<String> {
    match properties.get("profiles").and_then(Value::as_object) {
        Some(profiles) => find_secure(profiles, "profiles"),
        None => Vec::new(),
    }
}

/// Split secrets out of `tree`. Returns a copy without the secret leaves
/// and the removed values keyed by path. Paths that do not resolve, or
/// resolve to null, are skipped.
pub fn extract_secrets(tree: &Value, paths: &[String]) -> (Value, BTreeMap<String, Value>) {
    let mut stripped = tree.clone();
    let mut extracted = BTreeMap::new();
    for path in paths {
        if let Some(value) = take_path(&mut stripped, path) {
            extracted.insert(path.clone(), value);
        }
    }
    (stripped, extracted)
}

/// Inverse of [`extract_secrets`]: a copy of `tree` with each cached value
/// written back at its path. Only paths listed in `paths` are restored; a
/// path whose parent no longer exists is skipped.
pub fn splice_secrets(tree: &Value, secrets: &BTreeMap<String, Value>, paths: &[String]) -> Value {
    let mut spliced = tree.clone();
    for path in paths {
        if let Some(value) = secrets.get(path) {
            put_existing_parent(&mut spliced, path, value.clone());
        }
    }
    spliced
}

/// `a.b` -> `profiles.a.profiles.b`
pub fn profile_path_from_name(name: &str) -> String {
    format!("profiles.{}", name.split('.').collect::<Vec<_>>().join(".profiles."))
}

/// Names of the secure properties that apply to profile `name`, declared
/// either on the profile itself or on one of its ancestors.
pub fn secure_props_for_profile(paths: &[String], name: &str) -> Vec<String> {
    let profile_path = profile_path_from_name(name);
    let mut props = Vec::new();
    for path in paths {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() < 3 {
            continue;
        }
        let owner = segments[..segments.len() - 2].join(".");
        if profile_path == owner || profile_path.starts_with(&format!("{}.", owner)) {
            props.push(segments[segments.len() - 1].to_string());
        }
    }
    props
}

/// Where to record `property_path` (e.g. `profiles.lpar1.properties.password`)
/// as secure. With `find_up`, an ancestor profile that already lists the
/// property is preferred over the owning profile.
pub fn secure_info_for_prop(property_path: &str, find_up: Option<&Value>) -> Option<SecureInfo> {
    let idx = property_path.find(".properties.")?;
    let mut segments: Vec<&str> = property_path.split('.').collect();
    let prop = segments.pop()?.to_string();
    let mut path = format!("{}.secure", &property_path[..idx]);

    if let Some(layer) = find_up {
        while segments.len() > 2 {
            segments.pop();
            let candidate = format!("{}.secure", segments.join("."));
            let listed = get_path(layer, &candidate)
                .and_then(Value::as_array)
                .map(|a| a.iter().any(|v| v.as_str() == Some(prop.as_str())))
                .unwrap_or(false);
            if listed {
                path = candidate;
                break;
            }
        }
    }
    Some(SecureInfo { path, prop })
}

pub fn get_path<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(tree, |node, segment| node.get(segment))
}

/// Set `path`, creating intermediate objects as needed.
pub fn set_path(tree: &mut Value, path: &str, value: Value) {
    let mut node = tree;
    let segments: Vec<&str> = path.split('.').collect();
    for segment in &segments[..segments.len() - 1] {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let (Value::Object(map), Some(last)) = (node, segments.last()) {
        map.insert(last.to_string(), value);
    }
}

fn take_path(tree: &mut Value, path: &str) -> Option<Value> {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (parent_mut(tree, parent)?, leaf),
        None => (tree, path),
    };
    let map = parent.as_object_mut()?;
    if map.get(leaf).map_or(true, Value::is_null) {
        return None;
    }
    // Rebuild rather than remove so the remaining keys keep their order.
    let mut value = None;
    let kept: Map<String, Value> = std::mem::take(map)
        .into_iter()
        .filter_map(|(k, v)| {
            if k == leaf {
                value = Some(v);
                None
            } else {
                Some((k, v))
            }
        })
        .collect();
    *map = kept;
    value
}

fn put_existing_parent(tree: &mut Value, path: &str, value: Value) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => match parent_mut(tree, parent) {
            Some(p) => (p, leaf),
            None => return,
        },
        None => (tree, path),
    };
    if let Some(map) = parent.as_object_mut() {
        map.insert(leaf.to_string(), value);
    }
}

fn parent_mut<'a>(tree: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.').try_fold(tree, |node, segment| node.get_mut(segment))
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// In-memory secure cache plus the credential manager it persists through.
#[derive(Default)]
pub struct SecureStore {
    cache: SecureCache,
    vault: Option<Arc<dyn CredentialVault>>,
    load_failed: Option<bool>,
}

impl SecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_vault(&mut self, vault: Arc<dyn CredentialVault>) {
        self.vault = Some(vault);
    }

    pub fn has_vault(&self) -> bool {
        self.vault.is_some()
    }

    pub fn cache(&self) -> &SecureCache {
        &self.cache
    }

    /// True if the last [`SecureStore::load`] failed, or if no credential
    /// manager was ever supplied. Callers use this to decide whether to
    /// prompt for credentials instead.
    pub fn load_failed(&self) -> bool {
        self.load_failed.unwrap_or(self.vault.is_none())
    }

    /// Fetch the blob from the credential manager and splice cached values
    /// into `layers`. `vault`, when given, replaces the stored manager.
    pub fn load(
        &mut self,
        vault: Option<Arc<dyn CredentialVault>>,
        layers: &mut [ConfigLayer],
    ) -> Result<(), ConfigError> {
        if let Some(vault) = vault {
            self.vault = Some(vault);
        }
        let Some(vault) = self.vault.clone() else {
            return Ok(());
        };

        let blob = match vault.load(SECURE_ACCOUNT, true) {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                self.load_failed = Some(false);
                return Ok(());
            }
            Err(e) => {
                self.load_failed = Some(true);
                return Err(e.into());
            }
        };
        match serde_json::from_str::<SecureCache>(&blob) {
            Ok(cache) => self.cache = cache,
            Err(e) => {
                self.load_failed = Some(true);
                return Err(ConfigError::SecureBlob(e.to_string()));
            }
        }
        self.load_failed = Some(false);
        debug!("loaded secure properties for {} layer(s)", self.cache.len());

        for layer in layers.iter_mut() {
            self.load_cached(layer);
        }
        Ok(())
    }

    /// Copy cached secure values into `layer` without touching the vault.
    pub fn load_cached(&self, layer: &mut ConfigLayer) {
        if self.vault.is_none() {
            return;
        }
        if let Some(secrets) = self.cache.get(&cache_key(&layer.path)) {
            let paths = secure_paths(&layer.properties);
            layer.properties = splice_secrets(&layer.properties, secrets, &paths);
        }
    }

    /// Rebuild the cache entry for `layer` from its current secure paths and
    /// return a copy of its properties with the secrets removed.
    pub fn cache_and_prune(&mut self, layer: &ConfigLayer) -> Value {
        let paths = secure_paths(&layer.properties);
        let (stripped, extracted) = extract_secrets(&layer.properties, &paths);
        if self.vault.is_some() {
            let key = cache_key(&layer.path);
            self.cache.remove(&key);
            if !extracted.is_empty() {
                self.cache.insert(key, extracted);
            }
        }
        stripped
    }

    /// Re-cache `layers` and persist the blob. Nothing is written when the
    /// cache is empty and was empty before.
    pub fn save(&mut self, layers: &[&ConfigLayer]) -> Result<(), ConfigError> {
        if self.vault.is_none() {
            return Ok(());
        }
        let before = self.cache.len();
        for layer in layers {
            self.cache_and_prune(layer);
        }
        if !self.cache.is_empty() || before > 0 {
            self.direct_save()?;
        }
        Ok(())
    }

    /// Persist the cache as-is.
    pub fn direct_save(&self) -> Result<(), ConfigError> {
        let Some(vault) = &self.vault else {
            return Ok(());
        };
        let blob = serde_json::to_string(&self.cache)
            .map_err(|e| ConfigError::SecureBlob(e.to_string()))?;
        vault.save(SECURE_ACCOUNT, &blob)?;
        Ok(())
    }

    /// Drop cache entries for layer files that no longer exist. Returns the
    /// dropped paths.
    pub fn rm_unused_props(&mut self) -> Vec<String> {
        let pruned: Vec<String> = self
            .cache
            .keys()
            .filter(|k| !Path::new(k.as_str()).exists())
            .cloned()
            .collect();
        for key in &pruned {
            warn!("dropping secure properties of missing layer {}", key);
            self.cache.remove(key);
        }
        pruned
    }
}
