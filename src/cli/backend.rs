use crate::cli::CliContext;
use crate::core::registry::Registry;
use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use serde_json::{Map, Value};

#[derive(Subcommand, Debug)]
pub enum BackendCommand {
    /// List the known credential managers
    List(ListArgs),
    /// Show the selected credential manager
    Current,
    /// Select a credential manager
    Set(SetArgs),
    /// Restore the default credential manager
    Revert(RevertArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format (table|json)
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Display name of the credential manager
    pub name: String,

    /// Backend-specific options as a JSON object
    #[arg(long, value_name = "JSON")]
    pub options: Option<String>,
}

#[derive(Args, Debug)]
pub struct RevertArgs {
    /// Credential manager currently selected; only the incumbent may revert
    pub name: String,
}

pub fn run(ctx: &CliContext, command: BackendCommand) -> Result<()> {
    match command {
        BackendCommand::List(args) => run_list(ctx, args),
        BackendCommand::Current => run_current(ctx),
        BackendCommand::Set(args) => run_set(ctx, args),
        BackendCommand::Revert(args) => run_revert(ctx, args),
    }
}

fn run_list(ctx: &CliContext, args: ListArgs) -> Result<()> {
    let known = Registry::known_backends();
    if args.format == "json" {
        let json = serde_json::to_string_pretty(known).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }
    if args.format != "table" {
        bail!("invalid format: {} (use table|json)", args.format);
    }

    let current = ctx.registry.current();
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Plug-in package").add_attribute(Attribute::Bold),
        Cell::new("Host integration").add_attribute(Attribute::Bold),
        Cell::new("Selected").add_attribute(Attribute::Bold),
    ]);
    for backend in known {
        let selected = if current.name() == Some(backend.display_name) {
            "*"
        } else {
            ""
        };
        table.add_row(vec![
            backend.display_name,
            backend.extension_package_name.unwrap_or("-"),
            backend.host_integration_name.unwrap_or("-"),
            selected,
        ]);
    }
    println!("{}", table);
    Ok(())
}

fn run_current(ctx: &CliContext) -> Result<()> {
    let current = ctx.registry.current();
    println!("{}", current);
    if let Some(options) = ctx.registry.current_options() {
        let json = serde_json::to_string_pretty(&options).context("serialize options")?;
        println!("options: {}", json);
    }
    Ok(())
}

fn run_set(ctx: &CliContext, args: SetArgs) -> Result<()> {
    let options = match args.options {
        Some(raw) => Some(parse_options(&raw)?),
        None => None,
    };
    ctx.registry.ensure_settings()?;
    ctx.registry.record_override(&args.name, options)?;
    println!("credential manager set to '{}'", args.name);
    println!("the change takes effect the next time the CLI starts");
    Ok(())
}

fn run_revert(ctx: &CliContext, args: RevertArgs) -> Result<()> {
    ctx.registry.revert_to_default(&args.name)?;
    println!("credential manager reverted to '{}'", ctx.registry.current());
    Ok(())
}

fn parse_options(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("parse --options")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--options must be a JSON object"),
    }
}
