//! Start command - launches the proxy.

use anyhow::Result;
use clap::Args;

use cookiegate_proxy::{ProxyServer, RefreshTrigger};

use super::{AuthOverrides, Context};
use crate::session::{self, Session};

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Local dev server for non-API paths (overrides config)
    #[arg(long)]
    pub fallback: Option<String>,

    /// Proxy WebSocket upgrades on API paths
    #[arg(long)]
    pub ws: bool,

    #[command(flatten)]
    pub auth: AuthOverrides,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    args.auth.apply(&mut config);

    if args.port.is_some() || args.bind.is_some() || args.fallback.is_some() {
        let server = config.server_mut();
        if let Some(port) = args.port {
            server.port = port;
        }
        if let Some(bind) = &args.bind {
            server.bind = bind.clone();
        }
        if let Some(fallback) = &args.fallback {
            server.fallback_origin = Some(fallback.clone());
        }
    }
    if args.ws {
        config.auth_mut().websocket = true;
    }

    let resolved = config.resolve()?;

    if ctx.verbose {
        let sources = ctx.loaded.loaded_paths();
        if sources.is_empty() {
            eprintln!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                eprintln!("Loaded config: {}", source.display());
            }
        }
    }

    let session = Session::new(&resolved)?;
    let server = ProxyServer::new(session::proxy_config(&resolved)?, session.interceptor)?;

    // Requests arriving before the startup login settles wait on the gate.
    let _startup = session.gate.ensure_fresh(RefreshTrigger::Startup);

    eprintln!(
        "cookiegate listening on http://{} -> {}",
        resolved.bind_addr, resolved.target_origin
    );
    eprintln!(
        "SSO script: http://{}/__cookiegate/sso.js",
        resolved.bind_addr
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
