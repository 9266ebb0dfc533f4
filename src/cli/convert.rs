use crate::cli::CliContext;
use crate::constants;
use crate::core::convert::{self, ConvertEnv, ConvertOptions};
use crate::core::os_store::KeyringStore;
use crate::models::conversion::{ConversionResult, MsgKind};
use crate::util::fs as cl_fs;
use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::Confirm;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Delete the legacy profiles and their secure values after converting
    #[arg(long)]
    pub delete: bool,

    /// Do not ask before deleting
    #[arg(long)]
    pub yes: bool,

    /// Output format (text|json)
    #[arg(long, default_value = "text")]
    pub format: String,
}

pub fn run(ctx: &CliContext, args: ConvertArgs) -> Result<()> {
    if args.format != "text" && args.format != "json" {
        bail!("invalid format: {} (use text|json)", args.format);
    }
    if args.delete && !args.yes {
        if ctx.non_interactive {
            bail!("--non-interactive requires --yes for --delete");
        }
        let confirmed = Confirm::new()
            .with_prompt("Legacy profiles and their secure values will be deleted. Continue?")
            .default(false)
            .interact()
            .context("read confirmation")?;
        if !confirmed {
            println!("aborted; nothing was changed");
            return Ok(());
        }
    }

    let mut config = ctx.load_config(false)?;
    let env = ConvertEnv {
        paths: &ctx.paths,
        factory: &ctx.factory,
        registry: &ctx.registry,
        secret_store: Arc::new(KeyringStore),
    };
    let opts = ConvertOptions {
        delete_legacy_profiles: args.delete,
        external_profile_reader: None,
    };
    let result = convert::convert(&env, &mut config, &opts);

    if let Some(plugin) = &result.selected_backend_name {
        if let Err(e) = uninstall_plugin(&ctx.paths.plugins_file, plugin) {
            warn!("could not uninstall {}: {:#}", plugin, e);
        }
    }

    if args.format == "json" {
        let json = serde_json::to_string_pretty(&result).context("serialize result")?;
        println!("{}", json);
    } else {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        render(&result, &mut stdout.lock(), &mut stderr.lock())?;
    }

    if result.has_errors() {
        bail!("conversion finished with errors");
    }
    Ok(())
}

/// Write report lines to `out` and error lines to `err`.
pub fn render(result: &ConversionResult, out: &mut dyn Write, err: &mut dyn Write) -> Result<()> {
    for msg in &result.messages {
        let sink: &mut dyn Write = match msg.kind {
            MsgKind::Report => &mut *out,
            MsgKind::Error => &mut *err,
        };
        if msg.paragraph {
            writeln!(sink)?;
        }
        let indent = if msg.indent { "    " } else { "" };
        writeln!(sink, "{}{}", indent, msg.text)?;
    }
    Ok(())
}

/// Remove `plugin` from the installed-plugins file. A missing file or entry
/// is not an error.
fn uninstall_plugin(plugins_file: &Path, plugin: &str) -> Result<bool> {
    let content = match fs::read_to_string(plugins_file) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("read {}", plugins_file.display())),
    };
    let mut plugins: Value = serde_json::from_str(&content)
        .with_context(|| format!("parse {}", plugins_file.display()))?;
    let removed = plugins
        .as_object_mut()
        .and_then(|map| map.remove(plugin))
        .is_some();
    if removed {
        cl_fs::write_json_atomic(plugins_file, &plugins, constants::SETTINGS_FILE_MODE)
            .with_context(|| format!("write {}", plugins_file.display()))?;
    }
    Ok(removed)
}
