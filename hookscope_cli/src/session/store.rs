//! Durable credential storage
//!
//! Exactly one credential is persisted at a time, under the key `token`. The
//! record keeps the identifier the token was issued for, so a token is only
//! ever presented for that identifier.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Identifier and the token that authorizes its event stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identifier: String,
    pub token: String,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            token: token.into(),
        }
    }
}

/// On-disk layout of the credential file
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCredential {
    token: Option<Credential>,
}

/// Sequence number taken before an asynchronous session action
///
/// A result is committed only if no later ticket has been committed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

struct StoreState {
    credential: Option<Credential>,
    accepted: u64,
}

/// In-memory view of the persisted credential
pub struct CredentialStore {
    path: PathBuf,
    state: RwLock<StoreState>,
    issued: AtomicU64,
}

impl CredentialStore {
    /// Open the store, reading whatever credential was persisted last
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let credential = read_credential(&path)?;

        if credential.is_some() {
            tracing::debug!("Loaded stored credential from {}", path.display());
        }

        Ok(Self {
            path,
            state: RwLock::new(StoreState {
                credential,
                accepted: 0,
            }),
            issued: AtomicU64::new(0),
        })
    }

    /// Get the credential file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the stored credential
    pub fn credential(&self) -> Option<Credential> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credential
            .clone()
    }

    /// Check if a credential is stored
    pub fn has_credential(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credential
            .is_some()
    }

    /// The stored token, if it was issued for `identifier`
    pub fn token_for(&self, identifier: &str) -> Option<String> {
        self.credential()
            .filter(|c| c.identifier == identifier)
            .map(|c| c.token)
    }

    /// Take a ticket for an action that will commit later
    pub fn ticket(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Replace the stored credential unless a newer ticket already committed
    ///
    /// Returns `Ok(false)` when the ticket is stale and nothing was written.
    pub fn commit(&self, ticket: Ticket, credential: Option<Credential>) -> Result<bool, SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if ticket.0 < state.accepted {
            tracing::debug!(
                "Discarding stale credential update (ticket {}, accepted {})",
                ticket.0,
                state.accepted
            );
            return Ok(false);
        }

        write_credential(&self.path, credential.as_ref())?;
        state.credential = credential;
        state.accepted = ticket.0;

        Ok(true)
    }

    /// Persist a credential, superseding anything in flight
    #[cfg(test)]
    pub fn set(&self, credential: Credential) -> Result<(), SessionError> {
        self.commit(self.ticket(), Some(credential)).map(|_| ())
    }

    /// Remove the persisted credential
    pub fn clear(&self) -> Result<(), SessionError> {
        self.commit(self.ticket(), None).map(|_| ())
    }

    /// Remove the persisted credential only if it is still `credential`
    ///
    /// Returns `Ok(false)` when something else is stored. Tickets in flight
    /// are not superseded.
    pub fn clear_if(&self, credential: &Credential) -> Result<bool, SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.credential.as_ref() != Some(credential) {
            return Ok(false);
        }

        write_credential(&self.path, None)?;
        state.credential = None;

        Ok(true)
    }
}

fn read_credential(path: &Path) -> Result<Option<Credential>, SessionError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SessionError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let persisted: PersistedCredential = serde_yaml::from_str(&content).map_err(|e| {
        SessionError::Storage(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    Ok(persisted.token)
}

fn write_credential(path: &Path, credential: Option<&Credential>) -> Result<(), SessionError> {
    let Some(credential) = credential else {
        return match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        };
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            SessionError::Storage(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let persisted = PersistedCredential {
        token: Some(credential.clone()),
    };
    let content = serde_yaml::to_string(&persisted)
        .map_err(|e| SessionError::Storage(format!("Failed to serialize credential: {}", e)))?;

    fs::write(path, content)
        .map_err(|e| SessionError::Storage(format!("Failed to write {}: {}", path.display(), e)))
}
