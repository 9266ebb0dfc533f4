//! Shape of a layered configuration document.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One configuration layer file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default)]
    pub profiles: Map<String, Value>,
    #[serde(default)]
    pub defaults: Map<String, Value>,
    #[serde(rename = "autoStore", default, skip_serializing_if = "Option::is_none")]
    pub auto_store: Option<bool>,
}

/// A profile inside `profiles`. Nested profiles live under `profiles`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub secure: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub profiles: Map<String, Value>,
}

impl ConfigDocument {
    pub fn to_value(&self) -> Value {
        // A struct of maps, strings, and bools always serializes.
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

impl ProfileNode {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
