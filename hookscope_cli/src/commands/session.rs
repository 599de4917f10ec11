//! Stored session commands (status, link, logout)

use crate::session::Session;
use anyhow::Result;
use console::style;

/// Show the stored session and whether the backend still accepts it
pub async fn status(session: &Session) -> Result<()> {
    let Some(credential) = session.credential() else {
        println!("No stored session.");
        println!();
        println!("Start one with: hookscope register");
        return Ok(());
    };

    let state = match session.validate_stored(&credential.identifier).await {
        Ok(true) => style("valid").green(),
        Ok(false) => style("rejected").red(),
        Err(e) if e.is_transport() => style("unreachable").yellow(),
        Err(e) => return Err(e.into()),
    };

    println!("{:<10} {}", "ID", credential.identifier);
    println!("{:<10} {}", "Server", session.config().server_url);
    println!("{:<10} {}", "Token", state);
    println!("{:<10} {}", "Send to", session.send_url(&credential.identifier)?);

    Ok(())
}

/// Print the claim link for the stored session
pub fn link(session: &Session) -> Result<()> {
    let Some(credential) = session.credential() else {
        println!("No stored session.");
        return Ok(());
    };

    println!("{}", session.claim_link(&credential)?);
    Ok(())
}

/// Forget the stored session
pub fn logout(session: &Session) -> Result<()> {
    if !session.has_token() {
        println!("No stored session.");
        return Ok(());
    }

    session.clear_token()?;
    println!("Removed {}", session.credential_path().display());
    Ok(())
}
