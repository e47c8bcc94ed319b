//! Message and argument types

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A single typed message argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    String(String),
    Bool(bool),
    Blob(Bytes),
}

impl Arg {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            Arg::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Arg::Blob(_))
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "int",
            Arg::Float(_) => "float",
            Arg::String(_) => "string",
            Arg::Bool(_) => "bool",
            Arg::Blob(_) => "blob",
        }
    }
}

impl std::fmt::Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x),
            Arg::String(s) => write!(f, "{}", s),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::String(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::String(v)
    }
}

impl From<Bytes> for Arg {
    fn from(v: Bytes) -> Self {
        Arg::Blob(v)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self {
        Arg::Blob(Bytes::from(v))
    }
}

/// A decoded message: an address and its ordered arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub address: String,
    pub args: Vec<Arg>,
}

impl Message {
    pub fn new(address: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Command tag of [`BlobEnvelope`]
pub const BLOB_COMMAND: &str = "blob";

/// JSON envelope used to push a blob to a WebSocket peer.
///
/// Serialized as `{"command": "blob", "address": "...", "blob": [..bytes..]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEnvelope {
    pub command: String,
    pub address: String,
    pub blob: Vec<u8>,
}

impl BlobEnvelope {
    pub fn new(address: impl Into<String>, blob: impl Into<Vec<u8>>) -> Self {
        Self {
            command: BLOB_COMMAND.to_string(),
            address: address.into(),
            blob: blob.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::EncodeError(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let envelope: BlobEnvelope = serde_json::from_str(text)?;
        if envelope.command != BLOB_COMMAND {
            return Err(Error::DecodeError(format!(
                "unknown command: {}",
                envelope.command
            )));
        }
        Ok(envelope)
    }

    /// Convert back into an ordinary message carrying the blob inline
    pub fn into_message(self) -> Message {
        Message::new(self.address, vec![Arg::Blob(Bytes::from(self.blob))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_envelope_json() {
        let envelope = BlobEnvelope::new("/bla/blob", b"blobbyA".to_vec());
        let json = envelope.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["command"], "blob");
        assert_eq!(value["address"], "/bla/blob");

        let parsed = BlobEnvelope::from_json(&json).unwrap();
        let msg = parsed.into_message();
        assert_eq!(msg.address, "/bla/blob");
        assert_eq!(msg.args, vec![Arg::Blob(Bytes::from_static(b"blobbyA"))]);
    }

    #[test]
    fn test_blob_envelope_wrong_command() {
        let json = r#"{"command":"other","address":"/a","blob":[]}"#;
        assert!(BlobEnvelope::from_json(json).is_err());
    }
}
