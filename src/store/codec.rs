//! store::codec
//!
//! Serialization of records to file contents.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode: {0}")]
    Encode(String),

    #[error("failed to decode: {0}")]
    Decode(String),

    #[error("document is not a mapping")]
    NotAMapping,
}

/// Converts field values to and from file bytes.
///
/// Whole documents and `meta` files hold a mapping; the per-field files of
/// a file set hold any value.
pub trait Codec: Send + Sync + 'static {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError>;

    fn encode(&self, fields: &Map<String, Value>) -> Result<Vec<u8>, CodecError> {
        self.encode_value(&Value::Object(fields.clone()))
    }

    /// Decode a mapping. An empty document decodes to an empty map.
    fn decode(&self, bytes: &[u8]) -> Result<Map<String, Value>, CodecError> {
        match self.decode_value(bytes)? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            _ => Err(CodecError::NotAMapping),
        }
    }
}

/// YAML via `serde_yaml_ng`.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn extension(&self) -> &'static str {
        "yaml"
    }

    fn encode_value(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_yaml_ng::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_yaml_ng::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
