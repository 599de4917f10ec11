//! Error types for session and channel operations

use thiserror::Error;

/// Failures of the session/credential store
#[derive(Debug, Error)]
pub enum SessionError {
    /// Backend unreachable or the exchange broke off
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend refused the registration or answered without an id/token
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    /// A newer session action completed first; this result was discarded
    #[error("Superseded by a newer session action")]
    Superseded,

    /// Reading or writing the persisted credential failed
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Building an endpoint URL failed
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl SessionError {
    /// Whether retrying the same action may succeed
    pub fn is_transport(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }

    /// Whether the backend rejected the credentials
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, SessionError::RegistrationFailed(_))
    }
}

/// Failures when opening the live channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was invalidated by the backend; register or claim again
    #[error("Channel is unusable until a new registration")]
    Unusable,

    /// No stored token for this identifier
    #[error("No credential stored for {0}")]
    NoCredential(String),

    /// Building the connect URL failed
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}
