use crate::cli::CliContext;
use crate::constants;
use crate::util::fs as cl_fs;
use anyhow::{Context, Result};
use clap::Args;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also create an empty global configuration layer
    #[arg(long)]
    pub config: bool,
}

pub fn run(ctx: &CliContext, args: InitArgs) -> Result<()> {
    let paths = &ctx.paths;
    cl_fs::ensure_dir(&paths.home, constants::SETTINGS_DIR_MODE)
        .with_context(|| format!("create {}", paths.home.display()))?;

    if ctx.registry.ensure_settings()? {
        println!("settings created at {}", paths.settings_file.display());
    } else {
        println!("settings already present at {}", paths.settings_file.display());
    }

    if args.config {
        let mut config = ctx.load_config(false)?;
        if config.exists() {
            println!(
                "configuration already present at {}",
                config.layer_active().path.display()
            );
        } else {
            config.activate(false, true);
            config.save(false).context("write configuration")?;
            println!("configuration created at {}", config.layer_active().path.display());
        }
    }

    println!("credential manager: {}", ctx.registry.current());
    Ok(())
}
