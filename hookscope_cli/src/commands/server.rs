//! Server command - show or persist the backend URL

use crate::config::{config_file, Config};
use anyhow::{bail, Result};
use url::Url;

/// Print the effective backend URL, or save a new one
pub fn run(config: &Config, url: Option<String>) -> Result<()> {
    let Some(url) = url else {
        println!("{}", config.server_url);
        return Ok(());
    };

    let parsed = Url::parse(&url)?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("Server URL must use http or https: {}", url);
    }

    let mut saved = Config::load()?;
    saved.server_url = url.trim_end_matches('/').to_string();
    saved.save()?;

    println!("Saved {} to {}", saved.server_url, config_file().display());
    Ok(())
}
