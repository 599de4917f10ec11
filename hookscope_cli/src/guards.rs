//! Navigation guards for the inspection view
//!
//! Direct access only proceeds when the stored credential is valid for the
//! identifier. A claim link validates its token and stores it on success.

use crate::error::SessionError;
use crate::session::Session;
use hookscope_common::constants::{RECONNECT_ROUTE, RESULTS_ROUTE, TOKEN_QUERY};
use percent_encoding::percent_decode_str;
use std::fmt;
use url::Url;

/// A navigation target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    Results(String),
    Reconnect {
        identifier: String,
        token: Option<String>,
    },
}

impl Route {
    /// Parse a path or full link
    ///
    /// Anything that is not a results or reconnect route is the landing view.
    pub fn parse(target: &str) -> Route {
        let url = match Url::parse(target) {
            Ok(url) if url.has_host() => url,
            _ => match Url::parse("http://localhost/").and_then(|base| base.join(target)) {
                Ok(url) => url,
                Err(_) => return Route::Landing,
            },
        };

        let segments: Vec<String> = url
            .path_segments()
            .map(|s| {
                s.filter(|s| !s.is_empty())
                    .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        match segments.as_slice() {
            [route, identifier] if route == RESULTS_ROUTE => Route::Results(identifier.clone()),
            [route, identifier] if route == RECONNECT_ROUTE => Route::Reconnect {
                identifier: identifier.clone(),
                token: url
                    .query_pairs()
                    .find(|(k, _)| k == TOKEN_QUERY)
                    .map(|(_, v)| v.into_owned()),
            },
            _ => Route::Landing,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Landing => write!(f, "/"),
            Route::Results(id) => write!(f, "/{}/{}", RESULTS_ROUTE, id),
            Route::Reconnect { identifier, .. } => write!(f, "/{}/{}", RECONNECT_ROUTE, identifier),
        }
    }
}

/// Guard for opening an inspection view directly
pub async fn direct_access(session: &Session, identifier: &str) -> Result<Route, SessionError> {
    if session.validate_stored(identifier).await? {
        Ok(Route::Results(identifier.to_string()))
    } else {
        tracing::info!("No valid credential for {}", identifier);
        Ok(Route::Landing)
    }
}

/// Guard for a claim link
///
/// On success the token is persisted and the caller lands on the results
/// view; on rejection nothing is stored.
pub async fn claim_via_link(
    session: &Session,
    identifier: &str,
    token: &str,
) -> Result<Route, SessionError> {
    if session.claim(identifier, token).await? {
        tracing::info!("Claimed {}", identifier);
        Ok(Route::Results(identifier.to_string()))
    } else {
        tracing::info!("Claim for {} was rejected", identifier);
        Ok(Route::Landing)
    }
}

/// Resolve a route through its guard
pub async fn navigate(session: &Session, route: Route) -> Result<Route, SessionError> {
    tracing::debug!("Navigating to {}", route);

    match route {
        Route::Landing => Ok(Route::Landing),
        Route::Results(identifier) => direct_access(session, &identifier).await,
        Route::Reconnect {
            identifier,
            token: Some(token),
        } => claim_via_link(session, &identifier, &token).await,
        Route::Reconnect { token: None, .. } => Ok(Route::Landing),
    }
}
