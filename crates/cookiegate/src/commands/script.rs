//! Script command - prints the silent-SSO browser script.

use anyhow::Result;
use clap::Args;

use super::Context;
use crate::session;

/// Arguments for the script command.
#[derive(Args, Debug)]
pub struct ScriptArgs {
    /// Validation endpoint loaded in the hidden iframe (overrides config)
    #[arg(long)]
    pub validation_url: Option<String>,

    /// Auth cookie name to check for (overrides config)
    #[arg(long)]
    pub cookie_name: Option<String>,
}

/// Run the script command.
pub async fn run(args: ScriptArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    if let Some(url) = args.validation_url {
        config.auth_mut().validation_url = Some(url);
    }
    if let Some(name) = args.cookie_name {
        config.auth_mut().cookie_name = name;
    }

    let resolved = config.resolve()?;
    print!("{}", session::sso_script(&resolved).render());
    Ok(())
}
