//! CLI configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use url::Url;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hookscope")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".hookscope")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Get the persisted credential path
pub fn credential_file() -> PathBuf {
    config_dir().join("credential.yml")
}

/// Get the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure all config directories exist
pub fn ensure_dirs() -> Result<()> {
    let config = config_dir();
    let logs = logs_dir();

    fs::create_dir_all(&config).context("Failed to create config directory")?;
    fs::create_dir_all(&logs).context("Failed to create logs directory")?;

    Ok(())
}

/// Main configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend URL (default: http://localhost:18234)
    #[serde(default = "default_server_url")]
    pub server_url: String,
}

fn default_server_url() -> String {
    "http://localhost:18234".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = config_file();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_file();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Replace the server URL (from `--server` / `HOOKSCOPE_SERVER`)
    pub fn with_server(mut self, server_url: Option<String>) -> Self {
        if let Some(url) = server_url {
            self.server_url = url;
        }
        self
    }

    /// Get WebSocket URL from server URL
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = parse_server_url(&self.server_url)?;
        let ws_scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => anyhow::bail!("Unsupported server URL scheme: {}", other),
        };
        url.set_scheme(ws_scheme)
            .map_err(|_| anyhow::anyhow!("Cannot use {} over WebSocket", self.server_url))?;
        Ok(url)
    }

    /// HTTP endpoint below the server URL
    pub fn http_endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint(parse_server_url(&self.server_url)?, segments)
    }

    /// WebSocket endpoint below the server URL
    pub fn websocket_endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint(self.websocket_url()?, segments)
    }
}

fn parse_server_url(server_url: &str) -> Result<Url> {
    Url::parse(server_url).with_context(|| format!("Invalid server URL: {}", server_url))
}

/// Append percent-encoded path segments to a base URL
fn endpoint(mut url: Url, segments: &[&str]) -> Result<Url> {
    let base = url.to_string();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Server URL cannot be a base: {}", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
