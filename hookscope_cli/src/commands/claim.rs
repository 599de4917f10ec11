//! Claim command - adopt a session from a claim link

use super::watch;
use crate::guards::{self, Route};
use crate::session::Session;
use anyhow::{bail, Context, Result};
use console::style;
use std::sync::Arc;
use url::Url;

/// Handle claim command
pub async fn run(session: Arc<Session>, link: &str, watch_after: bool, tui: bool) -> Result<()> {
    let route = Route::parse(link);
    if !matches!(route, Route::Reconnect { .. }) {
        bail!("Not a claim link: {}", link);
    }

    warn_on_foreign_origin(&session, link)?;

    let route = guards::navigate(&session, route)
        .await
        .context("Failed to validate the claim link")?;

    match route {
        Route::Results(identifier) => {
            cliclack::log::success(format!("Claimed {}", style(&identifier).green()))?;
            if watch_after {
                watch::inspect(session, &identifier, tui).await?;
            }
            Ok(())
        }
        _ => {
            cliclack::outro_cancel("The link was rejected. Ask for a fresh one or register.")?;
            Ok(())
        }
    }
}

/// The token is only checked against the configured server
fn warn_on_foreign_origin(session: &Session, link: &str) -> Result<()> {
    let (Ok(link), Ok(server)) = (Url::parse(link), Url::parse(&session.config().server_url)) else {
        return Ok(());
    };

    if link.origin() != server.origin() {
        cliclack::log::warning(format!(
            "Link points at {}, validating against {} (use --server to change)",
            link.origin().ascii_serialization(),
            server.origin().ascii_serialization()
        ))?;
    }

    Ok(())
}
