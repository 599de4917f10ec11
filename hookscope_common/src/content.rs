//! Content-type classification
//!
//! Maps a raw `Content-Type` header value onto the kind of body it announces.
//! Parameters such as `; charset=utf-8` are ignored and the base media type
//! is compared case-insensitively.

use serde::{Deserialize, Serialize};

const PLAIN_TYPES: &[&str] = &["text/plain"];
const JSON_TYPES: &[&str] = &["application/json", "application/ld+json"];
const XML_TYPES: &[&str] = &["application/xml", "text/html"];
const SCRIPT_TYPES: &[&str] = &["text/javascript", "application/javascript"];
const FORM_TYPES: &[&str] = &["application/x-www-form-urlencoded"];
const MULTI_PART_FORM_TYPES: &[&str] = &["multipart/form-data"];

/// Semantic kind of a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyKind {
    UrlForm,
    MultiPartForm,
    Json,
    Xml,
    Binary,
    Unknown,
}

impl BodyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyKind::UrlForm => "url-form",
            BodyKind::MultiPartForm => "multi-part-form",
            BodyKind::Json => "json",
            BodyKind::Xml => "xml",
            BodyKind::Binary => "binary",
            BodyKind::Unknown => "unknown",
        }
    }

    /// Kinds the formatter parses into a tree
    pub fn is_structured(&self) -> bool {
        matches!(self, BodyKind::Json | BodyKind::Xml)
    }
}

/// A validated `type/subtype` pair, lower-cased, without parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
}

impl MediaType {
    /// Parse the base media type of a header value
    ///
    /// Returns `None` unless both halves are non-empty RFC 7230 tokens.
    pub fn parse(raw: &str) -> Option<Self> {
        let base = raw.split(';').next().unwrap_or_default().trim();
        let (top, sub) = base.split_once('/')?;

        if !is_token(top) || !is_token(sub) {
            return None;
        }

        Some(Self {
            essence: base.to_ascii_lowercase(),
        })
    }

    /// The `type/subtype` string
    pub fn essence(&self) -> &str {
        &self.essence
    }

    fn is_one_of(&self, set: &[&str]) -> bool {
        set.iter().any(|candidate| *candidate == self.essence)
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Classify a `Content-Type` header value
pub fn classify(content_type: &str) -> BodyKind {
    let Some(media_type) = MediaType::parse(content_type) else {
        return BodyKind::Unknown;
    };

    if media_type.is_one_of(JSON_TYPES) {
        BodyKind::Json
    } else if media_type.is_one_of(FORM_TYPES) {
        BodyKind::UrlForm
    } else if media_type.is_one_of(MULTI_PART_FORM_TYPES) {
        BodyKind::MultiPartForm
    } else if media_type.is_one_of(XML_TYPES) {
        BodyKind::Xml
    } else {
        BodyKind::Unknown
    }
}

/// Whether the body can be shown as highlighted source
pub fn can_render_as_code(content_type: &str) -> bool {
    MediaType::parse(content_type).is_some_and(|mt| {
        mt.is_one_of(PLAIN_TYPES)
            || mt.is_one_of(JSON_TYPES)
            || mt.is_one_of(XML_TYPES)
            || mt.is_one_of(SCRIPT_TYPES)
    })
}

/// Whether the body can be shown as an expandable tree
pub fn can_render_as_tree(content_type: &str) -> bool {
    MediaType::parse(content_type).is_some_and(|mt| mt.is_one_of(JSON_TYPES) || mt.is_one_of(XML_TYPES))
}
