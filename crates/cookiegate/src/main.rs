//! cookiegate - authenticating development proxy
//!
//! Main entry point for the cookiegate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod session;

use commands::{config, login, script, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// cookiegate - authenticating development proxy
#[derive(Parser)]
#[command(name = "cookiegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to config file (overrides default discovery)
    #[arg(long, global = true, env = "COOKIEGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy
    Start(start::StartArgs),

    /// Run one headless login and report the cookies obtained
    Login(login::LoginArgs),

    /// Print the silent-SSO browser script
    Script(script::ScriptArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const CONSOLE_FILTER: &str = "cookiegate=info,cookiegate_proxy=info,cookiegate_config=info,warn";
const VERBOSE_FILTER: &str =
    "cookiegate=debug,cookiegate_proxy=debug,cookiegate_config=debug,info";
const FILE_FILTER: &str =
    "cookiegate=trace,cookiegate_proxy=trace,cookiegate_config=trace,info";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = commands::load(cli.config.as_deref())?;

    // Console on stderr (stdout is reserved for command output), plus an
    // optional rotating JSON file.
    let filter = if cli.verbose {
        VERBOSE_FILTER
    } else {
        CONSOLE_FILTER
    };
    let console_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let log_dir = loaded.config.logging.as_ref().and_then(|l| l.log_dir());
    let (file_layer, _guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "cookiegate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Login(args) => login::run(args, &ctx).await,
        Commands::Script(args) => script::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
