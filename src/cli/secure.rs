use crate::cli::CliContext;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use dialoguer::Password;
use serde_json::Value;
use std::io::Read;
use zeroize::Zeroizing;

#[derive(Subcommand, Debug)]
pub enum SecureCommand {
    /// List secure property paths of the active layer
    Paths(PathsArgs),
    /// Store a secure property value
    Set(SetArgs),
    /// Drop stored secure values whose layer file no longer exists
    Prune,
}

#[derive(Args, Debug)]
pub struct PathsArgs {
    /// Only paths belonging to this profile (dotted name, e.g. lpar1.zosmf)
    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Property path, e.g. profiles.zosmf.properties.password
    pub property_path: String,

    /// Read value from stdin instead of interactive prompt
    #[arg(long)]
    pub from_stdin: bool,
}

pub fn run(ctx: &CliContext, command: SecureCommand) -> Result<()> {
    match command {
        SecureCommand::Paths(args) => run_paths(ctx, args),
        SecureCommand::Set(args) => run_set(ctx, args),
        SecureCommand::Prune => run_prune(ctx),
    }
}

fn run_paths(ctx: &CliContext, args: PathsArgs) -> Result<()> {
    let config = ctx.load_config(false)?;
    let paths = match &args.profile {
        Some(profile) => config.secure_props_for_profile(profile),
        None => config.secure_fields(),
    };
    if paths.is_empty() {
        println!("no secure properties in {}", config.layer_active().path.display());
        return Ok(());
    }
    for path in paths {
        println!("{}", path);
    }
    Ok(())
}

fn run_set(ctx: &CliContext, args: SetArgs) -> Result<()> {
    if !args.property_path.starts_with("profiles.") {
        bail!("secure properties live under profiles.<name>.properties");
    }
    if ctx.non_interactive && !args.from_stdin {
        bail!("--non-interactive requires --from-stdin for set");
    }

    let vault = ctx.vault()?;
    let mut config = ctx.load_config(false)?;
    config
        .load_secure(Some(vault))
        .context("load secure properties")?;

    let secret = read_secret(args.from_stdin, &args.property_path)?;
    if secret.is_empty() {
        bail!("value is empty");
    }

    config.set(&args.property_path, Value::String(secret.to_string()), true);
    config.save(false).context("save configuration")?;
    println!(
        "stored {} for {}",
        args.property_path,
        config.layer_active().path.display()
    );
    Ok(())
}

fn run_prune(ctx: &CliContext) -> Result<()> {
    let vault = ctx.vault()?;
    let mut config = ctx.load_config(false)?;
    config
        .load_secure(Some(vault))
        .context("load secure properties")?;

    let pruned = config.secure_mut().rm_unused_props();
    if pruned.is_empty() {
        println!("nothing to prune");
        return Ok(());
    }
    config
        .secure()
        .direct_save()
        .context("save secure properties")?;
    for path in &pruned {
        println!("pruned {}", path);
    }
    Ok(())
}

fn read_secret(from_stdin: bool, property_path: &str) -> Result<Zeroizing<String>> {
    let secret = if from_stdin {
        let mut buf = Zeroizing::new(String::new());
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read value from stdin")?;
        Zeroizing::new(buf.trim_end_matches(['\r', '\n']).to_string())
    } else {
        Zeroizing::new(
            Password::new()
                .with_prompt(format!("Value for {}", property_path))
                .allow_empty_password(false)
                .interact()
                .context("read value from prompt")?,
        )
    };
    Ok(secret)
}
