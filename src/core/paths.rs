//! CLI home resolution and the files kept inside it.

use crate::constants;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliPaths {
    pub home: PathBuf,
    pub settings_file: PathBuf,
    pub profiles: PathBuf,
    pub profiles_aside: PathBuf,
    pub plugins_file: PathBuf,
}

impl CliPaths {
    /// Resolve the CLI home from the flag, the environment, or `~/.credlayer`.
    pub fn resolve(home_arg: Option<PathBuf>) -> Result<Self> {
        if let Some(home) = home_arg {
            return Ok(Self::from_home(home));
        }
        if let Some(home) = env::var_os(constants::CLI_HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::from_home(PathBuf::from(home)));
        }
        let user_home = dirs::home_dir().context("cannot determine the user's home directory")?;
        Ok(Self::from_home(user_home.join(constants::DEFAULT_CLI_HOME_DIR)))
    }

    pub fn from_home(home: PathBuf) -> Self {
        let settings_file = home
            .join(constants::SETTINGS_DIR)
            .join(constants::SETTINGS_FILE);
        let profiles = home.join(constants::LEGACY_PROFILES_DIR);
        let profiles_aside = home.join(format!(
            "{}{}",
            constants::LEGACY_PROFILES_DIR,
            constants::LEGACY_PROFILES_ASIDE_SUFFIX
        ));
        let plugins_file = home.join(constants::PLUGINS_DIR).join(constants::PLUGINS_FILE);
        Self {
            home,
            settings_file,
            profiles,
            profiles_aside,
            plugins_file,
        }
    }
}

impl std::fmt::Display for CliPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "credlayer@{}", self.home.display())
    }
}
