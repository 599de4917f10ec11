//! Session context: backend calls plus the credential store
//!
//! The [`Session`] is created once per process and shared by the guards and
//! the live channel. It is the only writer of the persisted credential.

use super::store::{Credential, CredentialStore};
use crate::config::Config;
use crate::error::SessionError;
use hookscope_common::constants::{
    AUTH_HEADER, CONNECT_PATH, RECONNECT_ROUTE, REGISTER_PATH, SEND_PATH, TOKEN_QUERY,
    VALIDATE_PATH,
};
use hookscope_common::Registration;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Explicitly owned session state for one client process
pub struct Session {
    config: Config,
    client: Client,
    credentials: CredentialStore,
}

impl Session {
    /// Create a new session over an opened credential store
    pub fn new(config: Config, credentials: CredentialStore) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("hookscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    /// Get the configuration this session talks to
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the stored credential
    pub fn credential(&self) -> Option<Credential> {
        self.credentials.credential()
    }

    /// Where the credential is persisted
    pub fn credential_path(&self) -> &std::path::Path {
        self.credentials.path()
    }

    /// Check if a credential is stored
    pub fn has_token(&self) -> bool {
        self.credentials.has_credential()
    }

    /// The stored token for `identifier`, if it was issued for it
    pub fn token_for(&self, identifier: &str) -> Option<String> {
        self.credentials.token_for(identifier)
    }

    /// Register a fresh random identifier
    ///
    /// Any stored credential is cleared before the request is sent.
    pub async fn register_random(&self) -> Result<String, SessionError> {
        self.register(None).await
    }

    /// Register a caller-chosen identifier and token
    ///
    /// The backend may pad a short identifier, so use the returned one.
    pub async fn register_custom(&self, identifier: &str, token: &str) -> Result<String, SessionError> {
        let registration = Registration {
            id: identifier.to_string(),
            token: token.to_string(),
        };
        self.register(Some(registration)).await
    }

    async fn register(&self, body: Option<Registration>) -> Result<String, SessionError> {
        let ticket = self.credentials.ticket();
        self.credentials.commit(ticket, None)?;

        let url = self.endpoint(&[REGISTER_PATH])?;
        let request = match &body {
            Some(registration) => self.client.post(url).json(registration),
            None => self.client.post(url),
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!("Registration rejected: {}", status);
            return Err(SessionError::RegistrationFailed(format!(
                "server returned {}",
                status
            )));
        }

        let registration: Registration = response.json().await.map_err(|e| {
            SessionError::RegistrationFailed(format!("unexpected response: {}", e))
        })?;

        if registration.id.is_empty() || registration.token.is_empty() {
            return Err(SessionError::RegistrationFailed(
                "response is missing the id or token".to_string(),
            ));
        }

        let credential = Credential::new(registration.id.clone(), registration.token);
        if !self.credentials.commit(ticket, Some(credential))? {
            return Err(SessionError::Superseded);
        }

        tracing::info!("Registered {}", registration.id);
        Ok(registration.id)
    }

    /// Ask the backend whether `token` currently authorizes `identifier`
    ///
    /// Any status other than 200 means "not authorized".
    pub async fn validate(&self, identifier: &str, token: &str) -> Result<bool, SessionError> {
        let url = self.endpoint(&[VALIDATE_PATH, identifier])?;

        let response = self
            .client
            .head(url)
            .header(AUTH_HEADER, token)
            .send()
            .await?;

        let valid = response.status() == StatusCode::OK;
        tracing::debug!("Validation for {}: {}", identifier, response.status());

        Ok(valid)
    }

    /// Validate the stored token for `identifier`
    ///
    /// False without a network call when nothing is stored for it.
    pub async fn validate_stored(&self, identifier: &str) -> Result<bool, SessionError> {
        match self.credentials.token_for(identifier) {
            Some(token) => self.validate(identifier, &token).await,
            None => Ok(false),
        }
    }

    /// Validate a token and persist it only if it is accepted
    ///
    /// Returns `Ok(false)` without touching the store when the backend
    /// rejects the pair, and [`SessionError::Superseded`] when a newer
    /// session action committed while the validation was in flight.
    pub async fn claim(&self, identifier: &str, token: &str) -> Result<bool, SessionError> {
        let ticket = self.credentials.ticket();

        if !self.validate(identifier, token).await? {
            return Ok(false);
        }

        if !self
            .credentials
            .commit(ticket, Some(Credential::new(identifier, token)))?
        {
            return Err(SessionError::Superseded);
        }

        Ok(true)
    }

    /// Persist a credential unconditionally
    ///
    /// Only tests seed the store this way. Registration and claims commit
    /// through the ticket they took before going to the network, so a late
    /// response can never overwrite a newer credential.
    #[cfg(test)]
    pub fn set_token(&self, credential: Credential) -> Result<(), SessionError> {
        self.credentials.set(credential)
    }

    /// Remove the persisted credential
    pub fn clear_token(&self) -> Result<(), SessionError> {
        self.credentials.clear()
    }

    /// Remove the persisted credential if it is still `credential`
    pub fn revoke(&self, credential: &Credential) -> Result<bool, SessionError> {
        self.credentials.clear_if(credential)
    }

    /// Live channel URL for `identifier`, carrying the token in the query
    pub fn connect_url(&self, identifier: &str, token: &str) -> Result<Url, SessionError> {
        let mut url = self
            .config
            .websocket_endpoint(&[CONNECT_PATH, identifier])
            .map_err(|e| SessionError::Endpoint(e.to_string()))?;
        url.query_pairs_mut().append_pair(TOKEN_QUERY, token);
        Ok(url)
    }

    /// URL webhooks should be sent to
    pub fn send_url(&self, identifier: &str) -> Result<Url, SessionError> {
        self.endpoint(&[SEND_PATH, identifier])
    }

    /// Link that claims this session from another client
    pub fn claim_link(&self, credential: &Credential) -> Result<Url, SessionError> {
        let mut url = self.endpoint(&[RECONNECT_ROUTE, &credential.identifier])?;
        url.query_pairs_mut()
            .append_pair(TOKEN_QUERY, &credential.token);
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SessionError> {
        self.config
            .http_endpoint(segments)
            .map_err(|e| SessionError::Endpoint(e.to_string()))
    }
}
