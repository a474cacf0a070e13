//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};

use cookiegate_config::LayerStatus;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration and whether it resolves
    Show,

    /// Show which config files are loaded and their precedence
    Which,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;

    println!("# cookiegate configuration\n");

    let paths = loaded.loaded_paths();
    if paths.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for path in &paths {
            println!("# from {}", path.display());
        }
    }

    match config.resolve() {
        Ok(resolved) => {
            println!("# target origin: {}", resolved.target_origin);
            println!(
                "# headless login: {}",
                if resolved.headless_login.is_some() {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
        Err(e) => println!("# not runnable: {}", e),
    }
    println!();

    print!("{}", config.to_toml()?);

    if !loaded.warnings.is_empty() {
        println!();
        for w in &loaded.warnings {
            println!("# warning: {}", w);
        }
    }

    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    println!("Config file search order (later overrides earlier):\n");

    for layer in &loaded.layers {
        println!(
            "  {} {:<8} {}",
            layer_status(&layer.status),
            layer.kind,
            layer.path.display()
        );
        if let LayerStatus::Invalid(cause) = &layer.status {
            println!("      skipped: {}", cause);
        }
    }

    println!();
    let loaded_count = loaded.loaded_paths().len();
    if loaded_count == 0 {
        println!("No config files loaded. Create ./cookiegate.toml to configure the proxy.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

fn layer_status(status: &LayerStatus) -> &'static str {
    match status {
        LayerStatus::Loaded => "✓ loaded         ",
        LayerStatus::Missing => "· not found      ",
        LayerStatus::Invalid(_) => "✗ failed to parse",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_status_labels_line_up() {
        let labels = [
            layer_status(&LayerStatus::Loaded),
            layer_status(&LayerStatus::Missing),
            layer_status(&LayerStatus::Invalid("bad".to_string())),
        ];
        assert!(labels.iter().all(|l| l.chars().count() == labels[2].chars().count()));
        assert!(labels[2].contains("failed to parse"));
    }
}
