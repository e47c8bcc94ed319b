//! Error types for rhizome core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Address is not a well-formed slash-delimited path
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address lives under the reserved system namespace
    #[error("address is reserved: {0}")]
    ReservedAddress(String),

    /// Argument type that cannot travel through the router
    #[error("unsupported argument: {0}")]
    UnsupportedArgument(String),

    /// OSC encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// OSC or JSON decoding error
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Malformed connection-status message
    #[error("invalid connection status: {0}")]
    InvalidStatus(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DecodeError(e.to_string())
    }
}
