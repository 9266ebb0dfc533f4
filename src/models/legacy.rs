//! Legacy per-type-directory profile format.

use serde::Deserialize;
use serde_json::Value;

/// Contents of `<profiles>/<type>/<type>_meta.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyMeta {
    #[serde(rename = "defaultProfile", default)]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub configuration: Option<ProfileTypeConfig>,
}

/// Type schema declared by a legacy profile type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileTypeConfig {
    #[serde(rename = "type")]
    pub profile_type: String,
    #[serde(default)]
    pub schema: Value,
}
