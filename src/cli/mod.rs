//! CLI routing and command dispatch.

use crate::core::config::Config;
use crate::core::factory::BindingFactory;
use crate::core::overrides;
use crate::core::paths::CliPaths;
use crate::core::registry::Registry;
use crate::core::vault::CredentialVault;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub mod backend;
pub mod convert;
pub mod doctor;
pub mod init;
pub mod secure;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: CliPaths,
    pub project: Option<PathBuf>,
    pub non_interactive: bool,
    pub registry: Registry,
    /// Bound lazily: `convert-profiles` must be able to replace an obsolete
    /// override before anything is bound.
    pub factory: BindingFactory,
}

impl CliContext {
    pub fn new(paths: CliPaths, project: Option<PathBuf>, non_interactive: bool) -> Self {
        let registry = Registry::new(&paths.home);
        Self {
            paths,
            project,
            non_interactive,
            registry,
            factory: BindingFactory::new(),
        }
    }

    /// The bound credential manager, binding the configured one first if
    /// needed.
    pub fn vault(&self) -> Result<Arc<dyn CredentialVault>> {
        if !self.factory.is_initialized() {
            overrides::load_overrides(&self.factory, &self.registry)
                .context("initialize credential manager")?;
        }
        self.factory
            .manager()
            .context("no credential manager is active (overrides.CredentialManager is false)")
    }

    /// Load configuration layers. With `secure`, secure values are spliced
    /// in; a vault failure only warns so plain properties stay usable.
    pub fn load_config(&self, secure: bool) -> Result<Config> {
        let mut config = Config::load(&self.paths.home, self.project.as_deref())
            .context("load configuration")?;
        if secure {
            match self.vault() {
                Ok(vault) => {
                    if let Err(e) = config.load_secure(Some(vault)) {
                        warn!("secure properties not loaded: {}", e);
                    }
                }
                Err(e) => warn!("secure properties not loaded: {:#}", e),
            }
        }
        Ok(config)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "credlayer",
    version,
    about = "Secure credential storage for layered CLI profiles"
)]
pub struct Cli {
    /// CLI home directory (default: ~/.credlayer)
    #[arg(long, global = true, value_name = "PATH", env = "CREDLAYER_CLI_HOME")]
    pub home: Option<PathBuf>,

    /// Project directory holding project-level config layers
    #[arg(long, global = true, value_name = "DIR")]
    pub project: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "CREDLAYER_NON_INTERACTIVE")]
    pub non_interactive: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = CliPaths::resolve(self.home)?;
        let ctx = CliContext::new(paths, self.project, self.non_interactive);

        match self.command {
            Commands::Init(args) => init::run(&ctx, args),
            Commands::Backend { command } => backend::run(&ctx, command),
            Commands::Secure { command } => secure::run(&ctx, command),
            Commands::ConvertProfiles(args) => convert::run(&ctx, args),
            Commands::Doctor(args) => doctor::run(&ctx, args),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the CLI home and default settings
    Init(init::InitArgs),
    /// Show or change the credential manager
    Backend {
        #[command(subcommand)]
        command: backend::BackendCommand,
    },
    /// Inspect and store secure configuration properties
    Secure {
        #[command(subcommand)]
        command: secure::SecureCommand,
    },
    /// Convert legacy profiles to a layered configuration
    ConvertProfiles(convert::ConvertArgs),
    /// Diagnose installation and configuration (safe, read-only)
    Doctor(doctor::DoctorArgs),
}
