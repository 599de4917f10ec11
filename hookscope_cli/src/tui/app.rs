//! TUI application state and key handling

use crate::channel::{ChannelUpdate, CloseReason, EventLog};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::VecDeque;

/// Number of notices kept on screen
const MAX_NOTICES: usize = 3;

/// Severity of a notice line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Close,
    Reopen,
}

/// Static details of the inspected session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub identifier: String,
    pub send_url: String,
    pub version: String,
}

impl SessionInfo {
    pub fn new(identifier: impl Into<String>, send_url: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            send_url: send_url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// TUI application state
///
/// The event log and connection state live on the channel; this only holds
/// what the view adds on top.
pub struct InspectorApp {
    pub info: SessionInfo,
    pub notices: VecDeque<Notice>,
    pub detail_scroll: u16,
    pub show_raw: bool,
}

impl InspectorApp {
    pub fn new(info: SessionInfo) -> Self {
        Self {
            info,
            notices: VecDeque::with_capacity(MAX_NOTICES),
            detail_scroll: 0,
            show_raw: false,
        }
    }

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push_back(Notice {
            level,
            text: text.into(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    /// React to a channel update
    pub fn on_update(&mut self, update: &ChannelUpdate) {
        match update {
            ChannelUpdate::Opened => self.notify(NoticeLevel::Info, "Listening for requests"),
            ChannelUpdate::Request(_) => {}
            ChannelUpdate::Closed(CloseReason::User) => {
                self.notify(NoticeLevel::Info, CloseReason::User.notice())
            }
            ChannelUpdate::Closed(reason) if reason.invalidates_session() => {
                self.notify(NoticeLevel::Error, reason.notice())
            }
            ChannelUpdate::Closed(reason) => self.notify(
                NoticeLevel::Warning,
                format!("{}. Press r to reopen.", reason.notice()),
            ),
        }
    }

    /// Handle a key press against the channel's event log
    pub fn handle_key(&mut self, key: KeyEvent, log: &mut EventLog) -> Action {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => Action::Quit,
            (KeyCode::Char('c'), _) => Action::Close,
            (KeyCode::Char('r'), _) => Action::Reopen,
            (KeyCode::Char('t'), _) => {
                self.show_raw = !self.show_raw;
                self.detail_scroll = 0;
                Action::None
            }
            (KeyCode::Up | KeyCode::Char('k'), _) => {
                log.select_newer();
                self.detail_scroll = 0;
                Action::None
            }
            (KeyCode::Down | KeyCode::Char('j'), _) => {
                log.select_older();
                self.detail_scroll = 0;
                Action::None
            }
            (KeyCode::Home, _) => {
                log.select_newest();
                self.detail_scroll = 0;
                Action::None
            }
            (KeyCode::End, _) => {
                log.select_oldest();
                self.detail_scroll = 0;
                Action::None
            }
            (KeyCode::PageDown, _) => {
                self.detail_scroll = self.detail_scroll.saturating_add(10);
                Action::None
            }
            (KeyCode::PageUp, _) => {
                self.detail_scroll = self.detail_scroll.saturating_sub(10);
                Action::None
            }
            _ => Action::None,
        }
    }
}
