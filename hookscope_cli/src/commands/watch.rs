//! Watch command - inspect incoming requests live

use crate::channel::{ChannelUpdate, CloseReason, LiveChannel};
use crate::guards::{self, Route};
use crate::session::Session;
use crate::tui::{self, Action, InspectorApp, NoticeLevel, SessionInfo};
use anyhow::{anyhow, Context, Result};
use console::style;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Handle watch command
///
/// Without an identifier, the stored session is inspected.
pub async fn run(session: Arc<Session>, identifier: Option<String>, tui: bool) -> Result<()> {
    let identifier = identifier
        .or_else(|| session.credential().map(|c| c.identifier))
        .ok_or_else(|| anyhow!("No stored session. Run `hookscope register` first."))?;

    let route = guards::direct_access(&session, &identifier)
        .await
        .with_context(|| format!("Failed to validate {}", identifier))?;

    match route {
        Route::Results(identifier) => inspect(session, &identifier, tui).await,
        _ => {
            cliclack::outro_cancel(format!(
                "No valid credential for {}. Register again or claim a link.",
                identifier
            ))?;
            Ok(())
        }
    }
}

/// Open the live channel for an already-validated identifier
pub async fn inspect(session: Arc<Session>, identifier: &str, tui: bool) -> Result<()> {
    let send_url = session.send_url(identifier)?;

    let mut channel = LiveChannel::new(session);
    channel
        .open_stored(identifier)
        .context("Failed to open the live channel")?;

    if tui {
        run_tui(channel, SessionInfo::new(identifier, send_url.as_str())).await
    } else {
        run_plain(channel, identifier, send_url.as_str()).await
    }
}

/// Print one line per request until the connection ends
async fn run_plain(mut channel: LiveChannel, identifier: &str, send_url: &str) -> Result<()> {
    println!();
    println!(
        "  {} {}",
        style("Inspecting").green().bold(),
        style(identifier).white().bold()
    );
    println!("  {} {}", style("Send to").dim(), style(send_url).cyan());
    println!();

    loop {
        tokio::select! {
            update = channel.recv() => {
                match update {
                    Some(ChannelUpdate::Opened) => {
                        println!("  {}", style("Listening for requests (Ctrl+C to stop)").dim());
                    }
                    Some(ChannelUpdate::Request(seq)) => {
                        if let Some(entry) = channel.log().get(seq) {
                            let event = &entry.event;
                            println!(
                                "  {} {:>7} {}  {}",
                                style(event.time.format("%H:%M:%S")).dim(),
                                style(event.method.as_str()).yellow(),
                                event.uri,
                                style(event.body_kind().as_str()).dim()
                            );
                        }
                    }
                    Some(ChannelUpdate::Closed(reason)) => {
                        print_close(&reason);
                        return Ok(());
                    }
                    None => return Ok(()),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                channel.close();
                return Ok(());
            }
        }
    }
}

fn print_close(reason: &CloseReason) {
    let notice = reason.notice();
    if reason.invalidates_session() {
        eprintln!("  {}", style(notice).red());
    } else {
        eprintln!("  {}", style(notice).yellow());
    }
}

/// Run the interactive inspector
async fn run_tui(mut channel: LiveChannel, info: SessionInfo) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = InspectorApp::new(info);
    let result = run_tui_loop(&mut terminal, &mut app, &mut channel).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut InspectorApp,
    channel: &mut LiveChannel,
) -> Result<()> {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(100));

    loop {
        terminal.draw(|f| tui::draw(f, app, channel))?;

        tokio::select! {
            _ = tick_interval.tick() => {
                while event::poll(Duration::from_millis(0))? {
                    let Event::Key(key) = event::read()? else {
                        continue;
                    };
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }

                    match app.handle_key(key, channel.log_mut()) {
                        Action::Quit => {
                            channel.close();
                            return Ok(());
                        }
                        Action::Close => {
                            if channel.is_listening() {
                                channel.close();
                                app.notify(NoticeLevel::Info, CloseReason::User.notice());
                            }
                        }
                        Action::Reopen => match channel.reopen() {
                            Ok(true) => app.notify(NoticeLevel::Info, "Reconnecting..."),
                            Ok(false) if channel.is_unusable() => app.notify(
                                NoticeLevel::Warning,
                                "This session is no longer valid. Register or claim a link.",
                            ),
                            Ok(false) => app.notify(NoticeLevel::Warning, "Nothing to reopen"),
                            Err(e) => app.notify(NoticeLevel::Error, e.to_string()),
                        },
                        Action::None => {}
                    }
                }
            }

            Some(update) = channel.recv(), if channel.is_listening() => {
                app.on_update(&update);
            }
        }
    }
}
