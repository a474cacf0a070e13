//! Login command - one headless login through the refresh gate.

use anyhow::{Result, bail};
use clap::Args;

use cookiegate_proxy::{RefreshOutcome, RefreshTrigger};

use super::{AuthOverrides, Context};
use crate::session::Session;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[command(flatten)]
    pub auth: AuthOverrides,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    args.auth.apply(&mut config);
    let resolved = config.resolve()?;

    let session = Session::new(&resolved)?;
    let outcome = session.gate.ensure_fresh(RefreshTrigger::Manual).await;
    let cookies = session.store.names();

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "result": outcome, "cookie_names": cookies })
        );
    } else {
        match &outcome {
            RefreshOutcome::Refreshed { cookies: count } => {
                println!("Login succeeded ({} cookie(s))", count);
                for name in &cookies {
                    println!("  {}", name);
                }
            }
            RefreshOutcome::Skipped => {
                println!("Headless login is disabled.");
                println!("Set [auth] headless_login = true or add an [auth.headless_login] table.");
            }
            RefreshOutcome::Failed { .. } => {}
        }
    }

    if let RefreshOutcome::Failed { message } = outcome {
        bail!("headless login failed: {}", message);
    }
    Ok(())
}
