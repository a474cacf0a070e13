//! CLI command handlers.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use cookiegate_config::{ConfigLocations, CookiegateConfig, LoadedConfig};

pub mod config;
pub mod login;
pub mod script;
pub mod start;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load the config: an explicit file, or the discovered layers.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    Ok(match explicit {
        Some(path) => cookiegate_config::load_explicit(path)?,
        None => cookiegate_config::discover(&ConfigLocations::from_env()),
    })
}

/// Auth flags shared by every command that talks to the remote origin.
///
/// CLI arguments override config file values.
#[derive(Args, Debug, Default)]
pub struct AuthOverrides {
    /// Validation endpoint that sets the session cookies (overrides config)
    #[arg(long)]
    pub validation_url: Option<String>,

    /// Remote API origin (overrides config)
    #[arg(long)]
    pub target: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long)]
    pub insecure: bool,
}

impl AuthOverrides {
    pub fn apply(&self, config: &mut CookiegateConfig) {
        if self.validation_url.is_none() && self.target.is_none() && !self.insecure {
            return;
        }
        let auth = config.auth_mut();
        if let Some(url) = &self.validation_url {
            auth.validation_url = Some(url.clone());
        }
        if let Some(target) = &self.target {
            auth.target_origin = Some(target.clone());
        }
        if self.insecure {
            auth.insecure = true;
        }
    }
}
