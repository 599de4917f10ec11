//! Hookscope Common - Shared protocol library for the webhook inspector
//!
//! This crate contains the wire types exchanged with the Hookscope backend
//! together with the pure helpers used to classify and format request bodies.

pub mod body;
pub mod content;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

pub use body::{format, parse_url_form, FormattedBody};
pub use content::{can_render_as_code, can_render_as_tree, classify, BodyKind, MediaType};

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Frame is not valid UTF-8")]
    InvalidEncoding,
}

/// HTTP methods the backend captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Trace,
    Connect,
    Patch,
}

impl Method {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a captured request came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInfo {
    /// Host the request was addressed to
    pub host: Option<String>,

    /// Socket address of the connecting peer
    pub remote_ip: Option<SocketAddr>,

    /// Address taken from forwarding headers
    pub header_ip: Option<IpAddr>,

    /// Best guess of the real client address
    pub client_ip: Option<IpAddr>,
}

/// One HTTP request observed by the backend, pushed over the live channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub method: Method,

    pub content_type: Option<String>,

    pub body: Option<String>,

    /// True once the full body has been received
    pub complete: Option<bool>,

    /// Lower-cased header name to every value seen, in arrival order
    #[serde(deserialize_with = "lowercase_keys::deserialize")]
    pub headers: BTreeMap<String, Vec<String>>,

    pub cookies: BTreeMap<String, Vec<String>>,

    pub uri: String,

    #[serde(default)]
    pub remote: RemoteInfo,

    /// When the backend received the request
    pub time: DateTime<Utc>,
}

impl RequestEvent {
    /// Classify the body by its content type
    pub fn body_kind(&self) -> BodyKind {
        classify(self.content_type.as_deref().unwrap_or_default())
    }

    /// Format the body for display
    pub fn formatted_body(&self) -> FormattedBody {
        format(self.body_kind(), self.body.as_deref())
    }

    /// All values of a header (name is matched case-insensitively)
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Whether the body was cut short by the backend
    pub fn is_truncated(&self) -> bool {
        self.complete == Some(false)
    }
}

/// Decode one live-channel text frame
///
/// Every field except the nullable ones must be present; anything else is
/// reported as [`ProtocolError::MalformedFrame`].
pub fn decode_frame(text: &str) -> Result<RequestEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a binary frame carrying the same JSON payload
pub fn decode_binary_frame(data: &[u8]) -> Result<RequestEvent, ProtocolError> {
    let text = std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidEncoding)?;
    decode_frame(text)
}

/// Identifier and token pair exchanged with `/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,

    #[serde(alias = "auth")]
    pub token: String,
}

/// Header names are case-insensitive on the wire; fold them while decoding
/// and keep the values of colliding names in arrival order.
mod lowercase_keys {
    use serde::de::{MapAccess, Visitor};
    use serde::Deserializer;
    use std::collections::BTreeMap;
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = BTreeMap<String, Vec<String>>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header names to lists of values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
                while let Some((name, values)) = access.next_entry::<String, Vec<String>>()? {
                    headers
                        .entry(name.to_ascii_lowercase())
                        .or_default()
                        .extend(values);
                }
                Ok(headers)
            }
        }

        deserializer.deserialize_map(HeaderVisitor)
    }
}

/// Constants for the protocol
pub mod constants {
    /// Header carrying the token on validation requests
    pub const AUTH_HEADER: &str = "X-Auth";

    /// Query parameter carrying the token on channel and claim URLs
    pub const TOKEN_QUERY: &str = "token";

    /// Registration endpoint
    pub const REGISTER_PATH: &str = "register";

    /// Validation endpoint prefix (`validate/{id}`)
    pub const VALIDATE_PATH: &str = "validate";

    /// Live channel endpoint prefix (`connect/{id}`)
    pub const CONNECT_PATH: &str = "connect";

    /// Capture endpoint prefix webhooks are sent to (`send/{id}`)
    pub const SEND_PATH: &str = "send";

    /// Inspection view route prefix (`results/{id}`)
    pub const RESULTS_ROUTE: &str = "results";

    /// Claim-link route prefix (`reconnect/{id}?token=`)
    pub const RECONNECT_ROUTE: &str = "reconnect";

    /// Close code sent when the backend shuts down
    pub const CLOSE_GOING_AWAY: u16 = 1001;

    /// Close code sent when the session expired or the token was revoked
    pub const CLOSE_UNAUTHORIZED: u16 = 4001;
}
