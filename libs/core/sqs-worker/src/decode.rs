//! Message body decoders
//!
//! A decoder turns the raw SQS body string into the `Body` handed to the
//! handler. Three are built in:
//! - `identity`: the raw text, untouched (default)
//! - `json`: parse the body as JSON
//! - `base64_json`: unwrap an optional base64 layer, then parse JSON with
//!   support for `{"__type__": ..., "__value__": ...}` tagged values

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Decoded message body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Json(Value),
}

impl Body {
    /// Raw text, if the body was not parsed
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            Body::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(v) => Some(v),
            Body::Text(_) => None,
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Text(s) => f.write_str(s),
            Body::Json(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 value: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Unsupported tagged type '{0}'")]
    UnsupportedType(String),

    #[error("{0}")]
    Custom(String),
}

type DecodeFn = dyn Fn(&str) -> Result<Body, DecodeError> + Send + Sync;

/// Named, cloneable body decoder
#[derive(Clone)]
pub struct BodyDecoder {
    name: &'static str,
    decode: Arc<DecodeFn>,
}

impl BodyDecoder {
    /// Wrap a custom decoding function
    pub fn new<F>(name: &'static str, decode: F) -> Self
    where
        F: Fn(&str) -> Result<Body, DecodeError> + Send + Sync + 'static,
    {
        Self {
            name,
            decode: Arc::new(decode),
        }
    }

    pub fn identity() -> Self {
        Self::new("identity", |raw| Ok(Body::Text(raw.to_string())))
    }

    pub fn json() -> Self {
        Self::new("json", |raw| Ok(Body::Json(serde_json::from_str(raw)?)))
    }

    pub fn base64_json() -> Self {
        Self::new("base64_json", |raw| {
            let text = optional_base64_decode(raw);
            let value: Value = serde_json::from_str(&text)?;
            Ok(Body::Json(resolve_tagged(value)?))
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn decode(&self, raw: &str) -> Result<Body, DecodeError> {
        (self.decode)(raw)
    }
}

impl Default for BodyDecoder {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for BodyDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyDecoder").field(&self.name).finish()
    }
}

/// Decode `raw` as base64 only if it re-encodes to exactly the same text
/// and yields UTF-8. Otherwise return it unchanged.
pub fn optional_base64_decode(raw: &str) -> String {
    let trimmed = raw.trim();
    match STANDARD.decode(trimmed) {
        Ok(bytes) if STANDARD.encode(&bytes) == trimmed => {
            String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string())
        }
        _ => raw.to_string(),
    }
}

/// Replace `{"__type__": "bytes" | "base64", "__value__": ...}` objects.
///
/// `bytes` keeps the text value. `base64` decodes it, yielding a string when the
/// payload is UTF-8 and an array of byte values otherwise.
fn resolve_tagged(value: Value) -> Result<Value, DecodeError> {
    match value {
        Value::Object(map) => {
            if is_tagged(&map) {
                return decode_tagged(map);
            }
            let mut resolved = Map::with_capacity(map.len());
            for (key, inner) in map {
                resolved.insert(key, resolve_tagged(inner)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .into_iter()
            .map(resolve_tagged)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn is_tagged(map: &Map<String, Value>) -> bool {
    map.len() == 2 && map.contains_key("__type__") && map.contains_key("__value__")
}

fn decode_tagged(map: Map<String, Value>) -> Result<Value, DecodeError> {
    let kind = map.get("__type__").and_then(Value::as_str).unwrap_or_default();
    let payload = map
        .get("__value__")
        .and_then(Value::as_str)
        .unwrap_or_default();

    match kind {
        "bytes" => Ok(Value::String(payload.to_string())),
        "base64" => {
            let bytes = STANDARD.decode(payload)?;
            Ok(match String::from_utf8(bytes) {
                Ok(text) => Value::String(text),
                Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
            })
        }
        other => Err(DecodeError::UnsupportedType(other.to_string())),
    }
}
