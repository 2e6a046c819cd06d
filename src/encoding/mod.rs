//! Value encodings.
//!
//! A store is configured with one [`ValueEncoding`] that applies uniformly to
//! every stored value. The feed encodes on append and decodes on read, so the
//! store itself only ever sees bytes.

use std::fmt;

use bytes::Bytes;
use serde::Deserialize;

/// Errors converting between [`Value`] and stored bytes.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A value carried by the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

impl Value {
    /// Raw bytes view. JSON values are serialized.
    pub fn to_bytes(&self) -> Result<Bytes, EncodingError> {
        match self {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Value::Json(v) => Ok(Bytes::from(serde_json::to_vec(v)?)),
        }
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// Codec applied to stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    /// Values are opaque bytes; text and JSON are coerced to bytes on append.
    #[default]
    Binary,
    /// Values are UTF-8 strings.
    Utf8,
    /// Values are JSON documents.
    Json,
}

impl ValueEncoding {
    /// Coerce a value into the shape this encoding reads back.
    ///
    /// Only binary coerces; the other encodings pass values through untouched
    /// and leave the conversion to [`ValueEncoding::encode`].
    pub fn normalize(self, value: Value) -> Result<Value, EncodingError> {
        match (self, value) {
            (ValueEncoding::Binary, Value::Bytes(b)) => Ok(Value::Bytes(b)),
            (ValueEncoding::Binary, other) => Ok(Value::Bytes(other.to_bytes()?)),
            (_, other) => Ok(other),
        }
    }

    /// Serialize a value for storage.
    pub fn encode(self, value: &Value) -> Result<Vec<u8>, EncodingError> {
        match (self, value) {
            (ValueEncoding::Json, Value::Json(v)) => Ok(serde_json::to_vec(v)?),
            // Bare strings and bytes are stored as JSON strings so they read back
            // as JSON values.
            (ValueEncoding::Json, Value::Text(s)) => Ok(serde_json::to_vec(s)?),
            (ValueEncoding::Json, Value::Bytes(b)) => {
                Ok(serde_json::to_vec(&String::from_utf8(b.to_vec())?)?)
            }
            (_, other) => Ok(other.to_bytes()?.to_vec()),
        }
    }

    /// Deserialize stored bytes.
    pub fn decode(self, raw: Vec<u8>) -> Result<Value, EncodingError> {
        match self {
            ValueEncoding::Binary => Ok(Value::Bytes(Bytes::from(raw))),
            ValueEncoding::Utf8 => Ok(Value::Text(String::from_utf8(raw)?)),
            ValueEncoding::Json => Ok(Value::Json(serde_json::from_slice(&raw)?)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueEncoding::Binary => "binary",
            ValueEncoding::Utf8 => "utf8",
            ValueEncoding::Json => "json",
        }
    }
}

impl fmt::Display for ValueEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
