//! JSON schema describing configuration layers, built from the profile type
//! definitions found in legacy `<type>_meta.yaml` files.

use crate::constants::{APP_NAME, SETTINGS_FILE_MODE};
use crate::core::config::Config;
use crate::error::ConfigError;
use crate::models::legacy::ProfileTypeConfig;
use crate::util::fs as cl_fs;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::debug;

const JSON_SCHEMA: &str = "https://json-schema.org/draft/2020-12/schema";
const SCHEMA_VERSION: &str = "1.0";

pub fn schema_file_name() -> String {
    format!("{}.schema.json", APP_NAME)
}

/// Translate a legacy profile type schema into the `then` clause for
/// profiles of that type.
fn profile_type_schema(schema: &Value) -> Value {
    let mut properties = Map::new();
    let mut secure_props = Vec::new();

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (name, def) in props {
            let mut out = Map::new();
            out.insert("type".into(), def.get("type").cloned().unwrap_or(Value::Null));
            if let Some(option) = def.get("optionDefinition") {
                if let Some(desc) = option.get("description") {
                    out.insert("description".into(), desc.clone());
                }
                if let Some(default) = option.get("defaultValue").filter(|v| !v.is_null()) {
                    out.insert("default".into(), default.clone());
                }
                if let Some(values) = option.get("allowableValues").and_then(|a| a.get("values")) {
                    out.insert("enum".into(), values.clone());
                }
            }
            if def.get("secure").and_then(Value::as_bool).unwrap_or(false) {
                secure_props.push(Value::String(name.clone()));
            }
            properties.insert(name.clone(), Value::Object(out));
        }
    }

    let mut props_schema = json!({
        "type": schema.get("type").cloned().unwrap_or_else(|| json!("object")),
        "title": schema.get("title").cloned().unwrap_or(Value::Null),
        "description": schema.get("description").cloned().unwrap_or(Value::Null),
        "properties": properties,
    });
    if let Some(required) = schema.get("required") {
        props_schema["required"] = required.clone();
    }

    if secure_props.is_empty() {
        json!({ "properties": props_schema })
    } else {
        json!({ "properties": props_schema, "secure": { "items": { "enum": secure_props } } })
    }
}

pub fn build_schema(types: &[ProfileTypeConfig]) -> Value {
    let mut all_of = vec![json!({
        "if": { "properties": { "type": false } },
        "then": { "properties": { "properties": { "title": "Missing profile type" } } }
    })];
    let mut defaults = Map::new();
    for t in types {
        all_of.push(json!({
            "if": { "properties": { "type": { "const": t.profile_type } } },
            "then": { "properties": profile_type_schema(&t.schema) }
        }));
        defaults.insert(
            t.profile_type.clone(),
            json!({
                "description": format!("Default {} profile", t.profile_type),
                "type": "string"
            }),
        );
    }
    let type_names: Vec<&String> = defaults.keys().collect();

    json!({
        "$schema": JSON_SCHEMA,
        "$version": SCHEMA_VERSION,
        "type": "object",
        "description": format!("{} configuration", APP_NAME),
        "properties": {
            "profiles": {
                "type": "object",
                "description": "Mapping of profile names to profile configurations",
                "patternProperties": {
                    "^\\S*$": {
                        "type": "object",
                        "description": "Profile configuration object",
                        "properties": {
                            "type": {
                                "description": "Profile type",
                                "type": "string",
                                "enum": type_names
                            },
                            "properties": {
                                "description": "Profile properties object",
                                "type": "object"
                            },
                            "profiles": {
                                "description": "Optional subprofile configurations",
                                "type": "object",
                                "$ref": "#/properties/profiles"
                            },
                            "secure": {
                                "description": "Secure property names",
                                "type": "array",
                                "items": { "type": "string" },
                                "uniqueItems": true
                            }
                        },
                        "allOf": all_of
                    }
                }
            },
            "defaults": {
                "type": "object",
                "description": "Mapping of profile types to default profile names",
                "properties": defaults
            },
            "autoStore": {
                "type": "boolean",
                "description": "If true, values you enter when prompted are stored for future use"
            }
        }
    })
}

/// Write the schema next to the active layer and point the layer at it.
/// Returns the schema file path.
pub fn update_schema(
    config: &mut Config,
    types: &[ProfileTypeConfig],
) -> Result<PathBuf, ConfigError> {
    let layer_path = config.layer_active().path.clone();
    let dir = layer_path.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    let schema_path = dir.join(schema_file_name());

    cl_fs::write_json_atomic(&schema_path, &build_schema(types), SETTINGS_FILE_MODE).map_err(|e| {
        ConfigError::Write {
            path: schema_path.clone(),
            reason: e.to_string(),
        }
    })?;
    config.set_schema_ref(&format!("./{}", schema_file_name()));
    debug!("schema for {} profile type(s) written to {}", types.len(), schema_path.display());
    Ok(schema_path)
}
