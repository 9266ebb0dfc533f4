//! Reader for the legacy profile tree:
//!
//! ```text
//! <home>/profiles/<type>/<name>.yaml
//! <home>/profiles/<type>/<type>_meta.yaml
//! ```

use crate::constants::{LEGACY_META_SUFFIX, LEGACY_PROFILE_EXT, SECURELY_STORED_MARKER};
use crate::error::ConvertError;
use crate::models::legacy::LegacyMeta;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Profile type directories under `root`, sorted by name.
pub fn profile_type_dirs(root: &Path) -> Result<Vec<String>, ConvertError> {
    let entries = fs::read_dir(root)
        .map_err(|e| ConvertError::io(format!("list {}", root.display()), e))?;
    let mut types = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConvertError::io(format!("list {}", root.display()), e))?;
        if entry.path().is_dir() {
            types.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    types.sort();
    Ok(types)
}

/// Profile names in a type directory, sorted, without the meta file.
pub fn profile_names(type_dir: &Path, profile_type: &str) -> Result<Vec<String>, ConvertError> {
    let meta = meta_stem(profile_type);
    let entries = fs::read_dir(type_dir)
        .map_err(|e| ConvertError::io(format!("list {}", type_dir.display()), e))?;
    let mut names = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| ConvertError::io(format!("list {}", type_dir.display()), e))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some(LEGACY_PROFILE_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem != meta {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub fn profile_file(type_dir: &Path, name: &str) -> PathBuf {
    type_dir.join(format!("{}.{}", name, LEGACY_PROFILE_EXT))
}

pub fn meta_file(type_dir: &Path, profile_type: &str) -> PathBuf {
    type_dir.join(format!("{}.{}", meta_stem(profile_type), LEGACY_PROFILE_EXT))
}

fn meta_stem(profile_type: &str) -> String {
    format!("{}{}", profile_type, LEGACY_META_SUFFIX)
}

/// Properties of one legacy profile, in file order.
pub fn read_profile_file(path: &Path) -> Result<Map<String, Value>, ConvertError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConvertError::io(format!("read {}", path.display()), e))?;
    let parsed: Value = serde_yaml::from_str(&content).map_err(|e| ConvertError::Parse {
        context: format!("parse {}", path.display()),
        reason: e.to_string(),
    })?;
    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(ConvertError::Parse {
            context: format!("parse {}", path.display()),
            reason: format!("expected a mapping of properties, found {}", kind_of(&other)),
        }),
    }
}

pub fn read_meta_file(path: &Path) -> Result<LegacyMeta, ConvertError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConvertError::io(format!("read {}", path.display()), e))?;
    serde_yaml::from_str(&content).map_err(|e| ConvertError::Parse {
        context: format!("parse {}", path.display()),
        reason: e.to_string(),
    })
}

/// Vault account of a legacy secure property. Dots in a nested property
/// path become underscores.
pub fn profile_property_key(profile_type: &str, name: &str, property: &str) -> String {
    format!("{}_{}_{}", profile_type, name, property.replace('.', "_"))
}

/// Key of a converted profile in the new `profiles` map.
pub fn profile_map_key(profile_type: &str, name: &str) -> String {
    format!("{}_{}", profile_type, name)
}

pub fn is_secure_marker(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.starts_with(SECURELY_STORED_MARKER))
}

/// Number of legacy profiles across every type directory.
pub fn old_profile_count(root: &Path) -> Result<usize, ConvertError> {
    let mut count = 0;
    for profile_type in profile_type_dirs(root)? {
        count += profile_names(&root.join(&profile_type), &profile_type)?.len();
    }
    Ok(count)
}

/// Vault accounts referenced by secure markers anywhere under `root`.
/// Unreadable files are skipped.
pub fn secure_accounts(root: &Path) -> Vec<String> {
    let mut accounts = Vec::new();
    let Ok(types) = profile_type_dirs(root) else {
        return accounts;
    };
    for profile_type in types {
        let type_dir = root.join(&profile_type);
        for name in profile_names(&type_dir, &profile_type).unwrap_or_default() {
            match read_profile_file(&profile_file(&type_dir, &name)) {
                Ok(props) => accounts.extend(
                    props
                        .iter()
                        .filter(|(_, v)| is_secure_marker(v))
                        .map(|(k, _)| profile_property_key(&profile_type, &name, k)),
                ),
                Err(e) => debug!("skipping {}/{}: {}", profile_type, name, e),
            }
        }
    }
    accounts
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let fruit = dir.path().join("fruit");
        fs::create_dir_all(&fruit).unwrap();
        fs::write(fruit.join("fruit_meta.yaml"), "defaultProfile: apple\n").unwrap();
        fs::write(
            fruit.join("banana.yaml"),
            "color: yellow\nsecret: managed by @credlayer/cli\n",
        )
        .unwrap();
        fs::write(fruit.join("apple.yaml"), "color: red\n").unwrap();
        fs::write(fruit.join("notes.txt"), "ignored").unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("stray.yaml"), "x: 1").unwrap();
        dir
    }

    #[test]
    fn test_listing_is_sorted_and_skips_meta() {
        let dir = tree();
        assert_eq!(profile_type_dirs(dir.path()).unwrap(), vec!["empty", "fruit"]);
        assert_eq!(
            profile_names(&dir.path().join("fruit"), "fruit").unwrap(),
            vec!["apple", "banana"]
        );
        assert_eq!(old_profile_count(dir.path()).unwrap(), 2);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = old_profile_count(&dir.path().join("profiles")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_read_profile_keeps_file_order() {
        let dir = tree();
        let props = read_profile_file(&dir.path().join("fruit").join("banana.yaml")).unwrap();
        let keys: Vec<&String> = props.keys().collect();
        assert_eq!(keys, vec!["color", "secret"]);
        assert!(is_secure_marker(&props["secret"]));
        assert!(!is_secure_marker(&props["color"]));
    }

    #[test]
    fn test_read_profile_rejects_scalars_and_bad_yaml() {
        let dir = TempDir::new().unwrap();
        let scalar = dir.path().join("s.yaml");
        fs::write(&scalar, "just text").unwrap();
        assert!(matches!(read_profile_file(&scalar), Err(ConvertError::Parse { .. })));
        let broken = dir.path().join("b.yaml");
        fs::write(&broken, "a: [unclosed").unwrap();
        assert!(matches!(read_profile_file(&broken), Err(ConvertError::Parse { .. })));
    }

    #[test]
    fn test_read_meta() {
        let dir = tree();
        let meta = read_meta_file(&meta_file(&dir.path().join("fruit"), "fruit")).unwrap();
        assert_eq!(meta.default_profile.as_deref(), Some("apple"));
        assert!(meta.configuration.is_none());
    }

    #[test]
    fn test_keys() {
        assert_eq!(
            profile_property_key("zosmf", "lpar1", "auth.password"),
            "zosmf_lpar1_auth_password"
        );
        assert_eq!(profile_map_key("zosmf", "lpar1"), "zosmf_lpar1");
    }

    #[test]
    fn test_secure_accounts_from_markers() {
        let dir = tree();
        assert_eq!(secure_accounts(dir.path()), vec!["fruit_banana_secret"]);
        assert!(secure_accounts(&dir.path().join("missing")).is_empty());
    }
}
