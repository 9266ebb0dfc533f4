//! Report produced by a legacy profile conversion.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgKind {
    /// User-facing progress.
    Report,
    /// Failure; also written to the diagnostic log.
    Error,
}

/// One line of the conversion report, with layout hints for the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertMsg {
    pub kind: MsgKind,
    pub text: String,
    /// Start a new paragraph before this line.
    pub paragraph: bool,
    /// Indent this line under the previous one.
    pub indent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileFailure {
    /// Absent when the failure concerns the type as a whole (its meta file).
    pub name: Option<String>,
    pub profile_type: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub messages: Vec<ConvertMsg>,
    pub profiles_found: usize,
    pub profiles_converted: BTreeMap<String, Vec<String>>,
    pub profiles_failed: Vec<ProfileFailure>,
    /// Obsolete credential-manager plugin that should be uninstalled.
    pub selected_backend_name: Option<String>,
    pub secrets_migrated: bool,
    pub new_config_path: Option<PathBuf>,
    /// The override was reset but the old backend is still bound in this
    /// process; the new one takes effect on the next start.
    pub restart_required: bool,
}

impl Default for ConversionResult {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            profiles_found: 0,
            profiles_converted: BTreeMap::new(),
            profiles_failed: Vec::new(),
            selected_backend_name: None,
            secrets_migrated: true,
            new_config_path: None,
            restart_required: false,
        }
    }
}

impl ConversionResult {
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.kind == MsgKind::Error)
    }

    pub fn converted_count(&self) -> usize {
        self.profiles_converted.values().map(Vec::len).sum()
    }
}
