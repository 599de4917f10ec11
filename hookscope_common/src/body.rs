//! Body formatting for display
//!
//! JSON and XML bodies are parsed into a [`serde_json::Value`] tree; every
//! other kind is passed through as plain text.

use crate::content::BodyKind;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

/// Prefix for attribute keys in an XML tree
const ATTRIBUTE_PREFIX: &str = "@_";

/// Key holding the text of an element that also has children or attributes
const TEXT_KEY: &str = "#text";

/// Display representation of a request body
#[derive(Debug, Clone, PartialEq)]
pub enum FormattedBody {
    /// The request carried no body
    NoBody,

    /// Parsed JSON or XML
    Tree { kind: BodyKind, value: Value },

    /// The body claimed to be JSON or XML but could not be parsed
    Malformed {
        kind: BodyKind,
        error: String,
        raw: String,
    },

    /// Shown verbatim, not parsed
    PlainText { kind: BodyKind, text: String },
}

impl FormattedBody {
    /// Whether the body can be explored as a tree
    pub fn is_interactive(&self) -> bool {
        matches!(self, FormattedBody::Tree { .. })
    }

    /// The unparsed text, if any
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            FormattedBody::Malformed { raw, .. } => Some(raw),
            FormattedBody::PlainText { text, .. } => Some(text),
            FormattedBody::NoBody | FormattedBody::Tree { .. } => None,
        }
    }
}

/// Format a raw body according to its kind
///
/// An absent or empty body is [`FormattedBody::NoBody`], never an empty tree.
pub fn format(kind: BodyKind, raw: Option<&str>) -> FormattedBody {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return FormattedBody::NoBody,
    };

    let parsed = match kind {
        BodyKind::Json => serde_json::from_str::<Value>(raw).map_err(|e| e.to_string()),
        BodyKind::Xml => parse_xml(raw),
        BodyKind::UrlForm | BodyKind::MultiPartForm | BodyKind::Binary | BodyKind::Unknown => {
            return FormattedBody::PlainText {
                kind,
                text: raw.to_string(),
            };
        }
    };

    match parsed {
        Ok(value) => FormattedBody::Tree { kind, value },
        Err(error) => FormattedBody::Malformed {
            kind,
            error,
            raw: raw.to_string(),
        },
    }
}

/// Decode an `application/x-www-form-urlencoded` body into ordered pairs
pub fn parse_url_form(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

/// An element whose end tag has not been seen yet
struct OpenElement {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl OpenElement {
    fn root() -> Self {
        Self {
            name: String::new(),
            children: Map::new(),
            text: String::new(),
        }
    }

    fn from_start(start: &BytesStart) -> Result<Self, quick_xml::Error> {
        let mut element = Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Self::root()
        };

        for attr in start.html_attributes() {
            let attr = attr?;
            let key = format!(
                "{}{}",
                ATTRIBUTE_PREFIX,
                String::from_utf8_lossy(attr.key.as_ref())
            );
            let value = attr.unescape_value()?.into_owned();
            element.children.insert(key, Value::String(value));
        }

        Ok(element)
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            return Value::String(self.text);
        }

        let mut children = self.children;
        if !self.text.is_empty() {
            children.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(children)
    }
}

/// Add a child, turning repeated sibling names into a list
fn insert_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            children.insert(name, value);
        }
    }
}

/// Pop the innermost open element into its parent
fn fold_top(stack: &mut Vec<OpenElement>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(element) = stack.pop() {
        let name = element.name.clone();
        let value = element.into_value();
        if let Some(parent) = stack.last_mut() {
            insert_child(&mut parent.children, name, value);
        }
    }
}

/// Parse XML (or loosely formed HTML) into a generic tree
///
/// End tags close the nearest open element of the same name, folding any
/// unclosed elements in between; stray end tags are ignored.
fn parse_xml(raw: &str) -> Result<Value, String> {
    let mut reader = Reader::from_str(raw);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;

    let mut stack = vec![OpenElement::root()];
    let mut saw_element = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                saw_element = true;
                stack.push(OpenElement::from_start(&start).map_err(|e| e.to_string())?);
            }
            Event::Empty(start) => {
                saw_element = true;
                let element = OpenElement::from_start(&start).map_err(|e| e.to_string())?;
                let name = element.name.clone();
                if let Some(parent) = stack.last_mut() {
                    insert_child(&mut parent.children, name, element.into_value());
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                if let Some(pos) = stack.iter().skip(1).rposition(|el| el.name == name) {
                    while stack.len() > pos + 1 {
                        fold_top(&mut stack);
                    }
                }
            }
            Event::Text(text) => {
                let text = match text.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_element {
        return Err("no root element".to_string());
    }

    while stack.len() > 1 {
        fold_top(&mut stack);
    }

    let root = stack.pop().map(|root| root.children).unwrap_or_default();
    Ok(Value::Object(root))
}
