//! Diagnostics for the CLI home, credential manager, and configuration.

use crate::cli::CliContext;
use crate::core::config::Config;
use crate::core::legacy_read;
use crate::core::os_store::KeyringStore;
use crate::core::registry::Registry;
use crate::core::vault::SecretStore;
use crate::models::backend::SelectedBackend;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip the OS keychain probe (useful on headless hosts)
    #[arg(long)]
    pub no_keychain: bool,
}

pub fn run(ctx: &CliContext, args: DoctorArgs) -> Result<()> {
    let paths = &ctx.paths;
    let mut ok = 0u32;
    let mut warn = 0u32;
    let mut fail = 0u32;

    println!("Doctor: {}", paths);

    if paths.home.is_dir() {
        println!("  [PASS] CLI home exists: {}", paths.home.display());
        ok += 1;
    } else {
        println!("  [FAIL] CLI home missing: {} (run: credlayer init)", paths.home.display());
        fail += 1;
    }

    // Settings and the selected credential manager
    match ctx.registry.read_settings() {
        Ok(settings) => {
            println!("  [PASS] settings readable: {}", paths.settings_file.display());
            ok += 1;
            match settings.selected() {
                Some(SelectedBackend::Disabled) => {
                    println!(
                        "  [WARN] credential manager disabled; \
                         secure properties are stored in plain text"
                    );
                    warn += 1;
                }
                Some(SelectedBackend::Named(name))
                    if Registry::by_display_name(&name).is_none() =>
                {
                    println!("  [WARN] credential manager '{}' is not a known manager", name);
                    warn += 1;
                }
                Some(selected) => {
                    println!("  [PASS] credential manager: {}", selected);
                    ok += 1;
                }
                None => {}
            }
        }
        Err(e) => {
            println!("  [FAIL] {}", e);
            fail += 1;
        }
    }

    if args.no_keychain {
        println!("  [INFO] keychain probe skipped");
    } else {
        match KeyringStore.probe() {
            Ok(()) => {
                println!("  [PASS] OS keychain reachable");
                ok += 1;
            }
            Err(e) => {
                println!("  [FAIL] OS keychain unavailable: {}", e);
                fail += 1;
            }
        }
    }

    // Configuration layers
    match Config::load(&paths.home, ctx.project.as_deref()) {
        Ok(config) => {
            let existing: Vec<_> = config.layers().iter().filter(|l| l.exists).collect();
            if existing.is_empty() {
                println!("  [INFO] no configuration layers found");
            } else {
                for layer in &existing {
                    println!("  [PASS] config layer: {}", layer.path.display());
                    ok += 1;
                }
                check_secure(ctx, config, &mut ok, &mut warn);
            }
        }
        Err(e) => {
            println!("  [FAIL] {}", e);
            fail += 1;
        }
    }

    // Legacy profiles waiting for conversion
    let legacy = if paths.profiles.is_dir() {
        legacy_read::old_profile_count(&paths.profiles)
    } else {
        Ok(0)
    };
    match legacy {
        Ok(0) => {}
        Ok(n) => {
            println!(
                "  [WARN] {} legacy profile(s) in {} (run: credlayer convert-profiles)",
                n,
                paths.profiles.display()
            );
            warn += 1;
        }
        Err(e) => {
            println!("  [WARN] cannot read legacy profiles: {}", e);
            warn += 1;
        }
    }
    if paths.profiles_aside.is_dir() {
        println!(
            "  [INFO] converted legacy profiles kept in {} \
             (run: credlayer convert-profiles --delete)",
            paths.profiles_aside.display()
        );
    }

    // Summary
    println!();
    println!("Doctor summary: {} pass, {} warn, {} fail", ok, warn, fail);
    if fail > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn check_secure(ctx: &CliContext, mut config: Config, ok: &mut u32, warn: &mut u32) {
    let vault = match ctx.vault() {
        Ok(v) => v,
        Err(e) => {
            println!("  [WARN] secure properties not checked: {:#}", e);
            *warn += 1;
            return;
        }
    };
    if let Err(e) = config.load_secure(Some(vault)) {
        println!("  [WARN] secure properties failed to load: {}", e);
        *warn += 1;
        return;
    }
    if config.secure().load_failed() {
        println!("  [WARN] secure properties failed to load");
        *warn += 1;
        return;
    }
    println!("  [PASS] secure properties loaded ({} layer(s))", config.secure().cache().len());
    *ok += 1;

    let unused: Vec<&String> = config
        .secure()
        .cache()
        .keys()
        .filter(|k| !std::path::Path::new(k.as_str()).exists())
        .collect();
    if !unused.is_empty() {
        println!(
            "  [WARN] {} stored layer(s) no longer exist (run: credlayer secure prune)",
            unused.len()
        );
        *warn += 1;
    }
}
