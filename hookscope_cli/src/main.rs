//! Hookscope CLI - Inspect webhooks live from the terminal
//!
//! Usage:
//!   hookscope register [--id ID]   Register a new inspection session
//!   hookscope watch [ID]           Inspect incoming requests live
//!   hookscope claim <LINK>         Adopt a session from a claim link
//!   hookscope status               Show the stored session
//!   hookscope link                 Print the claim link for the stored session
//!   hookscope logout               Forget the stored session
//!   hookscope server [URL]         Show or save the backend URL

mod channel;
mod commands;
mod config;
mod error;
mod guards;
mod session;
mod tui;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hookscope")]
#[command(author = "Hookscope Team")]
#[command(version)]
#[command(about = "Inspect webhooks live from the terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend URL (overrides the config file)
    #[arg(long, global = true, env = "HOOKSCOPE_SERVER")]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new inspection session
    Register {
        /// Request a specific identifier
        #[arg(long)]
        id: Option<String>,

        /// Token for the requested identifier (generated if omitted)
        #[arg(long, requires = "id")]
        token: Option<String>,

        /// Start inspecting right away
        #[arg(short, long)]
        watch: bool,

        /// Print requests as plain lines instead of the interactive view
        #[arg(long)]
        no_tui: bool,
    },

    /// Inspect incoming requests live
    Watch {
        /// Identifier to inspect (defaults to the stored session)
        id: Option<String>,

        /// Print requests as plain lines instead of the interactive view
        #[arg(long)]
        no_tui: bool,
    },

    /// Adopt a session from a claim link
    Claim {
        /// Link of the form <server>/reconnect/<id>?token=<token>
        link: String,

        /// Start inspecting after a successful claim
        #[arg(short, long)]
        watch: bool,

        /// Print requests as plain lines instead of the interactive view
        #[arg(long)]
        no_tui: bool,
    },

    /// Show the stored session
    Status,

    /// Print the claim link for the stored session
    Link,

    /// Forget the stored session
    Logout,

    /// Show the backend URL, or save a new default
    Server {
        /// URL to save in the config file
        url: Option<String>,
    },
}

impl Commands {
    /// Whether this invocation takes over the terminal
    fn uses_tui(&self) -> bool {
        match self {
            Commands::Register { watch, no_tui, .. } | Commands::Claim { watch, no_tui, .. } => {
                *watch && !*no_tui
            }
            Commands::Watch { no_tui, .. } => !*no_tui,
            _ => false,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure config directories exist
    config::ensure_dirs()?;

    init_logging(cli.verbose, cli.command.uses_tui())?;

    let config = config::Config::load()?.with_server(cli.server);
    let store = session::CredentialStore::open(config::credential_file())
        .context("Failed to load the stored session")?;
    let session =
        Arc::new(session::Session::new(config, store).context("Failed to create HTTP client")?);

    // Handle commands
    match cli.command {
        Commands::Register {
            id,
            token,
            watch,
            no_tui,
        } => {
            let opts = commands::register::RegisterOptions {
                id,
                token,
                watch,
                tui: !no_tui,
            };
            commands::register::run(session, opts).await?;
        }

        Commands::Watch { id, no_tui } => {
            commands::watch::run(session, id, !no_tui).await?;
        }

        Commands::Claim {
            link,
            watch,
            no_tui,
        } => {
            commands::claim::run(session, &link, watch, !no_tui).await?;
        }

        Commands::Status => {
            commands::session::status(&session).await?;
        }

        Commands::Link => {
            commands::session::link(&session)?;
        }

        Commands::Logout => {
            commands::session::logout(&session)?;
        }

        Commands::Server { url } => {
            commands::server::run(session.config(), url)?;
        }
    }

    Ok(())
}

/// Log to stderr, or to a file while the interactive view owns the terminal
fn init_logging(verbose: bool, tui: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_level.into());

    if tui {
        let path = config::logs_dir().join("hookscope.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
