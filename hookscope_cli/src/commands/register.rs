//! Register command - obtain a new identifier and token

use super::watch;
use crate::session::Session;
use anyhow::{anyhow, Result};
use console::style;
use std::sync::Arc;

pub struct RegisterOptions {
    /// Requested identifier; a random one is issued when absent
    pub id: Option<String>,
    /// Token for a custom identifier; generated when absent
    pub token: Option<String>,
    /// Start inspecting right after registering
    pub watch: bool,
    pub tui: bool,
}

/// Handle register command
pub async fn run(session: Arc<Session>, opts: RegisterOptions) -> Result<()> {
    use cliclack::{intro, note, outro};

    intro(style(" hookscope register ").on_cyan().black().to_string())?;

    if session.has_token() {
        cliclack::log::info("Replacing the stored session")?;
    }

    let spinner = cliclack::spinner();
    spinner.start("Registering...");

    let result = match opts.id {
        Some(id) => {
            let token = opts
                .token
                .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
            session.register_custom(&id, &token).await
        }
        None => session.register_random().await,
    };

    let identifier = match result {
        Ok(identifier) => {
            spinner.stop("Registered");
            identifier
        }
        Err(e) => {
            spinner.error(&e);
            if e.is_transport() {
                cliclack::log::warning(format!(
                    "Could not reach {}",
                    session.config().server_url
                ))?;
            } else if e.is_auth_failure() {
                cliclack::log::info("The identifier may already be taken; try another --id")?;
            }
            return Err(e.into());
        }
    };

    let credential = session
        .credential()
        .ok_or_else(|| anyhow!("Registration did not store a credential"))?;
    let send_url = session.send_url(&identifier)?;
    let claim_link = session.claim_link(&credential)?;

    note(
        "Session",
        format!(
            "ID:          {}\nSend to:     {}\nClaim link:  {}",
            identifier, send_url, claim_link
        ),
    )?;

    if opts.watch {
        outro("Opening inspector")?;
        return watch::inspect(session, &identifier, opts.tui).await;
    }

    outro(format!(
        "Run {} to inspect requests",
        style("hookscope watch").cyan()
    ))?;

    Ok(())
}
