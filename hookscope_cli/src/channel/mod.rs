//! Live event channel for one inspection view
//!
//! A [`LiveChannel`] owns at most one connection at a time. The connection
//! task forwards decoded events over a queue; [`LiveChannel::recv`] drains it
//! and applies each event in order, so the log and the credential are only
//! ever touched from the view's own task.

mod connection;
mod log;

pub use log::EventLog;

use crate::error::ChannelError;
use crate::session::{Credential, Session};
use connection::{ChannelEvent, Connection};
use hookscope_common::constants::{CLOSE_GOING_AWAY, CLOSE_UNAUTHORIZED};
use std::fmt;
use std::sync::Arc;

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed from this side
    User,
    /// Backend shut the session down (1001)
    GoingAway,
    /// Backend refused the token (4001, or 401/403 on the upgrade)
    Unauthorized,
    /// Any other close; the session stays valid
    Other { code: Option<u16>, reason: String },
    /// Transport failure before or during the connection
    Failed(String),
}

impl CloseReason {
    /// Map a close frame code
    pub fn from_code(code: Option<u16>, reason: String) -> Self {
        match code {
            Some(CLOSE_GOING_AWAY) => CloseReason::GoingAway,
            Some(CLOSE_UNAUTHORIZED) => CloseReason::Unauthorized,
            code => CloseReason::Other { code, reason },
        }
    }

    /// Whether the stored credential must be dropped
    pub fn invalidates_session(&self) -> bool {
        matches!(self, CloseReason::GoingAway | CloseReason::Unauthorized)
    }

    /// User-facing explanation
    pub fn notice(&self) -> String {
        match self {
            CloseReason::User => "Connection closed".to_string(),
            CloseReason::GoingAway => {
                "The server ended this session. Register again to keep inspecting.".to_string()
            }
            CloseReason::Unauthorized => {
                "The server rejected this token. Register or claim a session again.".to_string()
            }
            CloseReason::Other { code: Some(code), reason } if !reason.is_empty() => {
                format!("Connection closed ({}: {})", code, reason)
            }
            CloseReason::Other { code: Some(code), .. } => format!("Connection closed ({})", code),
            CloseReason::Other { code: None, .. } => "Connection closed".to_string(),
            CloseReason::Failed(e) => format!("Connection failed: {}", e),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::User => write!(f, "closed by user"),
            CloseReason::GoingAway => write!(f, "going away"),
            CloseReason::Unauthorized => write!(f, "unauthorized"),
            CloseReason::Other { code: Some(code), .. } => write!(f, "closed ({})", code),
            CloseReason::Other { code: None, .. } => write!(f, "closed"),
            CloseReason::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Connecting,
    Open,
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Unopened => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Open => "Open",
            ConnectionState::Closed(_) => "Closed",
        }
    }
}

/// What a drained event changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelUpdate {
    Opened,
    /// A request was logged under this sequence number
    Request(u64),
    Closed(CloseReason),
}

/// Event channel bound to one inspection view
pub struct LiveChannel {
    session: Arc<Session>,
    identifier: Option<String>,
    /// Credential the current or last connection presented
    presented: Option<Credential>,
    state: ConnectionState,
    unusable: bool,
    log: EventLog,
    connection: Option<Connection>,
}

impl LiveChannel {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            identifier: None,
            presented: None,
            state: ConnectionState::Unopened,
            unusable: false,
            log: EventLog::new(),
            connection: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    /// Whether the backend invalidated the session on this channel
    pub fn is_unusable(&self) -> bool {
        self.unusable
    }

    /// Whether a connection task is attached
    pub fn is_listening(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the channel with an explicit token
    ///
    /// Any prior connection is closed first, so at most one is ever live.
    pub fn open(&mut self, identifier: &str, token: &str) -> Result<(), ChannelError> {
        if self.unusable {
            return Err(ChannelError::Unusable);
        }

        let url = self
            .session
            .connect_url(identifier, token)
            .map_err(|e| ChannelError::Endpoint(e.to_string()))?;

        if self.connection.take().is_some() {
            tracing::debug!("Replacing open connection");
        }

        self.identifier = Some(identifier.to_string());
        self.presented = Some(Credential::new(identifier, token));
        self.connection = Some(Connection::spawn(url));
        self.state = ConnectionState::Connecting;

        Ok(())
    }

    /// Open the channel with the stored token for `identifier`
    pub fn open_stored(&mut self, identifier: &str) -> Result<(), ChannelError> {
        let token = self
            .session
            .token_for(identifier)
            .ok_or_else(|| ChannelError::NoCredential(identifier.to_string()))?;
        self.open(identifier, &token)
    }

    /// Close the connection from this side
    ///
    /// The session stays valid, so [`reopen`](Self::reopen) works afterwards.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            tracing::info!("Connection closed by user");
            self.state = ConnectionState::Closed(CloseReason::User);
        }
    }

    /// Reconnect with the stored token
    ///
    /// Returns `Ok(false)` when the channel is unusable or was never opened.
    pub fn reopen(&mut self) -> Result<bool, ChannelError> {
        if self.unusable {
            tracing::debug!("Not reopening an invalidated channel");
            return Ok(false);
        }

        let Some(identifier) = self.identifier.clone() else {
            return Ok(false);
        };

        self.open_stored(&identifier)?;
        Ok(true)
    }

    /// Wait for the next connection event and apply it
    ///
    /// Returns `None` immediately when no connection is attached.
    pub async fn recv(&mut self) -> Option<ChannelUpdate> {
        let connection = self.connection.as_mut()?;
        let event = connection.inbound.recv().await;
        Some(self.apply(event))
    }

    fn apply(&mut self, event: Option<ChannelEvent>) -> ChannelUpdate {
        match event {
            Some(ChannelEvent::Opened) => {
                tracing::info!("Connection open");
                self.state = ConnectionState::Open;
                ChannelUpdate::Opened
            }
            Some(ChannelEvent::Request(event)) => {
                tracing::debug!("{} {}", event.method, event.uri);
                ChannelUpdate::Request(self.log.push(*event))
            }
            Some(ChannelEvent::Closed(reason)) => self.handle_close(reason),
            None => self.handle_close(CloseReason::Failed("connection task ended".to_string())),
        }
    }

    fn handle_close(&mut self, reason: CloseReason) -> ChannelUpdate {
        self.connection = None;

        if reason.invalidates_session() {
            tracing::warn!("Session invalidated: {}", reason);
            self.unusable = true;
            if let Some(credential) = &self.presented {
                match self.session.revoke(credential) {
                    Ok(true) => {
                        tracing::debug!("Cleared stored credential for {}", credential.identifier)
                    }
                    Ok(false) => tracing::debug!("Stored credential is not the one presented"),
                    Err(e) => tracing::error!("Failed to clear stored credential: {}", e),
                }
            }
        } else {
            tracing::info!("Connection {}", reason);
        }

        self.state = ConnectionState::Closed(reason.clone());
        ChannelUpdate::Closed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credential;
    use crate::testing::{frame, MockBackend, MockFrame};
    use std::time::Duration;

    async fn next(channel: &mut LiveChannel) -> ChannelUpdate {
        tokio::time::timeout(Duration::from_secs(5), channel.recv())
            .await
            .expect("timed out waiting for channel")
            .expect("channel has no connection")
    }

    async fn until_closed(channel: &mut LiveChannel) -> CloseReason {
        loop {
            if let ChannelUpdate::Closed(reason) = next(channel).await {
                return reason;
            }
        }
    }

    async fn setup(frames: Vec<MockFrame>) -> (MockBackend, tempfile::TempDir, LiveChannel) {
        let backend = MockBackend::start().await;
        backend.insert("abc", "secret").await;
        backend.script("abc", frames).await;

        let dir = tempfile::tempdir().unwrap();
        let session = backend.session(&dir);
        session.set_token(Credential::new("abc", "secret")).unwrap();

        (backend, dir, LiveChannel::new(session))
    }

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(CloseReason::from_code(Some(1001), String::new()), CloseReason::GoingAway);
        assert_eq!(CloseReason::from_code(Some(4001), String::new()), CloseReason::Unauthorized);
        assert!(!CloseReason::from_code(Some(1000), String::new()).invalidates_session());
        assert!(!CloseReason::from_code(None, String::new()).invalidates_session());
        assert!(!CloseReason::User.invalidates_session());
    }

    #[tokio::test]
    async fn test_events_are_logged_newest_first() {
        let (_backend, _dir, mut channel) = setup(vec![
            MockFrame::Text(frame("POST", "/e1")),
            MockFrame::Text(frame("PUT", "/e2")),
            MockFrame::Text(frame("GET", "/e3")),
        ])
        .await;

        channel.open_stored("abc").unwrap();
        assert_eq!(channel.state(), &ConnectionState::Connecting);
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
        assert_eq!(channel.state(), &ConnectionState::Open);

        for _ in 0..3 {
            assert!(matches!(next(&mut channel).await, ChannelUpdate::Request(_)));
        }

        let uris: Vec<_> = channel.log().iter().map(|e| e.event.uri.as_str()).collect();
        assert_eq!(uris, vec!["/e3", "/e2", "/e1"]);
        assert_eq!(channel.log().selected().unwrap().event.uri, "/e1");
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped() {
        let (_backend, _dir, mut channel) = setup(vec![
            MockFrame::Text("not json".to_string()),
            MockFrame::Text("{}".to_string()),
            MockFrame::Text(frame("POST", "/ok")),
            MockFrame::Close(1000),
        ])
        .await;

        channel.open_stored("abc").unwrap();
        let reason = until_closed(&mut channel).await;

        assert!(matches!(reason, CloseReason::Other { code: Some(1000), .. }));
        assert_eq!(channel.log().len(), 1);
        assert_eq!(channel.log().iter().next().unwrap().event.uri, "/ok");
    }

    #[tokio::test]
    async fn test_server_close_is_answered() {
        let (backend, _dir, mut channel) = setup(vec![MockFrame::Close(4000)]).await;

        channel.open_stored("abc").unwrap();
        until_closed(&mut channel).await;
        backend.wait_close_replies(1).await;
    }

    #[tokio::test]
    async fn test_unauthorized_close_clears_credential() {
        let (_backend, _dir, mut channel) = setup(vec![MockFrame::Close(4001)]).await;

        channel.open_stored("abc").unwrap();
        assert_eq!(until_closed(&mut channel).await, CloseReason::Unauthorized);

        assert!(channel.is_unusable());
        assert!(!channel.session.has_token());
        assert!(!channel.reopen().unwrap());
        assert_eq!(channel.state(), &ConnectionState::Closed(CloseReason::Unauthorized));
        assert!(matches!(channel.open("abc", "secret"), Err(ChannelError::Unusable)));
    }

    #[tokio::test]
    async fn test_unauthorized_close_keeps_other_credential() {
        let (backend, _dir, mut channel) = setup(vec![]).await;
        backend.insert("xyz", "other").await;
        backend.script("xyz", vec![MockFrame::Close(4001)]).await;

        channel.open("xyz", "other").unwrap();
        assert_eq!(until_closed(&mut channel).await, CloseReason::Unauthorized);

        assert!(channel.is_unusable());
        assert_eq!(
            channel.session.credential(),
            Some(Credential::new("abc", "secret"))
        );
        assert!(channel.session.validate_stored("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_handshake_keeps_stored_credential() {
        let (_backend, _dir, mut channel) = setup(vec![]).await;

        // A wrong token for the stored identifier is not the stored credential
        channel.open("abc", "wrong").unwrap();
        assert_eq!(until_closed(&mut channel).await, CloseReason::Unauthorized);
        assert!(channel.is_unusable());
        assert_eq!(channel.session.token_for("abc"), Some("secret".to_string()));
    }

    #[tokio::test]
    async fn test_going_away_clears_credential() {
        let (_backend, _dir, mut channel) = setup(vec![MockFrame::Close(1001)]).await;

        channel.open_stored("abc").unwrap();
        assert_eq!(until_closed(&mut channel).await, CloseReason::GoingAway);

        assert!(!channel.session.has_token());
        assert!(!channel.reopen().unwrap());
    }

    #[tokio::test]
    async fn test_other_close_keeps_credential() {
        let (backend, _dir, mut channel) = setup(vec![MockFrame::Close(4000)]).await;

        channel.open_stored("abc").unwrap();
        let reason = until_closed(&mut channel).await;
        assert!(matches!(reason, CloseReason::Other { code: Some(4000), .. }));

        assert!(channel.session.has_token());
        assert!(channel.reopen().unwrap());
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
        assert_eq!(backend.connections(), 2);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_unauthorized() {
        let (backend, _dir, mut channel) = setup(vec![]).await;
        // Token revoked on the backend after it was stored
        backend.insert("abc", "rotated").await;

        channel.open_stored("abc").unwrap();
        assert_eq!(until_closed(&mut channel).await, CloseReason::Unauthorized);
        assert!(channel.is_unusable());
        assert!(!channel.session.has_token());
    }

    #[tokio::test]
    async fn test_user_close_allows_reopen() {
        let (backend, _dir, mut channel) = setup(vec![]).await;

        channel.open_stored("abc").unwrap();
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
        backend.wait_active(1).await;

        channel.close();
        assert_eq!(channel.state(), &ConnectionState::Closed(CloseReason::User));
        assert!(!channel.is_listening());
        assert!(channel.recv().await.is_none());
        backend.wait_active(0).await;

        assert!(channel.session.has_token());
        assert!(channel.reopen().unwrap());
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
    }

    #[tokio::test]
    async fn test_open_replaces_prior_connection() {
        let (backend, _dir, mut channel) = setup(vec![]).await;

        channel.open_stored("abc").unwrap();
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
        backend.wait_active(1).await;

        channel.open_stored("abc").unwrap();
        assert_eq!(next(&mut channel).await, ChannelUpdate::Opened);
        assert_eq!(backend.connections(), 2);
        backend.wait_active(1).await;
    }

    #[tokio::test]
    async fn test_open_without_credential() {
        let (_backend, _dir, mut channel) = setup(vec![]).await;
        channel.session.clear_token().unwrap();

        assert!(matches!(
            channel.open_stored("abc"),
            Err(ChannelError::NoCredential(_))
        ));
        assert!(!channel.reopen().unwrap());
        assert_eq!(channel.state(), &ConnectionState::Unopened);
    }
}
