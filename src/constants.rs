//! Centralized constants for service names, settings keys, paths, and limits.

/// Display name of the built-in credential manager.
pub const DEFAULT_BACKEND_NAME: &str = "@credlayer/cli";

/// Service name under which the built-in credential manager stores secrets.
pub const DEFAULT_SERVICE_NAME: &str = "Credlayer";

/// Service names used by earlier releases. Searched after the primary
/// service, only when the primary is [`DEFAULT_SERVICE_NAME`].
pub const LEGACY_SERVICE_NAMES: &[&str] = &[
    "@credlayer/core",
    DEFAULT_BACKEND_NAME,
    "Credlayer-Plugin",
    "Vendor-Plugin",
];

/// Largest value the platform keychain accepts in a single cell.
pub const MAX_CELL_LEN: usize = 2560;

/// Appended to a chunked value so the reader knows where it ends.
pub const CHUNK_TERMINATOR: char = '\0';

/// Vault account holding the secure-property blob for every config layer.
pub const SECURE_ACCOUNT: &str = "secure_config_props";

/// Settings file location, relative to the CLI home.
pub const SETTINGS_DIR: &str = "settings";
pub const SETTINGS_FILE: &str = "imperative.json";

/// Key inside `overrides` naming the selected credential manager.
pub const CRED_MGR_SETTING_NAME: &str = "CredentialManager";

/// Credential manager overrides written by the obsolete secure-credential-store
/// plugin and its predecessors. Matched as substrings, first match wins.
pub const OBSOLETE_OVERRIDE_NAMES: &[&str] = &[
    OBSOLETE_SCS_PLUGIN_NAME,
    "KeytarCredentialManager",
    "Credlayer-Plugin",
    "Vendor-Plugin",
];

/// Package name of the obsolete secure-credential-store plugin.
pub const OBSOLETE_SCS_PLUGIN_NAME: &str = "@credlayer/secure-credential-store";

/// Prefix of a legacy profile value whose real content lives in the vault.
pub const SECURELY_STORED_MARKER: &str = "managed by";

/// Legacy profile layout.
pub const LEGACY_PROFILES_DIR: &str = "profiles";
pub const LEGACY_PROFILES_ASIDE_SUFFIX: &str = "-old";
pub const LEGACY_PROFILE_EXT: &str = "yaml";
pub const LEGACY_META_SUFFIX: &str = "_meta";

/// Installed plugin registry, relative to the CLI home.
pub const PLUGINS_DIR: &str = "plugins";
pub const PLUGINS_FILE: &str = "plugins.json";

/// Application name used for config layer and schema file names.
pub const APP_NAME: &str = "credlayer";

/// Environment variable overriding the CLI home directory.
pub const CLI_HOME_ENV: &str = "CREDLAYER_CLI_HOME";

/// Default CLI home directory name under the user's home.
pub const DEFAULT_CLI_HOME_DIR: &str = ".credlayer";

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "CREDLAYER_LOG";

/// Permission mode for the settings directory.
pub const SETTINGS_DIR_MODE: u32 = 0o700;

/// Permission mode for the settings file and config layers.
pub const SETTINGS_FILE_MODE: u32 = 0o600;

/// Property names renamed when legacy profiles are converted.
pub const RENAMED_PROPERTIES: &[(&str, &str)] = &[
    ("hostname", "host"),
    ("username", "user"),
    ("pass", "password"),
];
