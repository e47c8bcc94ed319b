//! Router error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("server full: {0}")]
    ServerFull(String),

    #[error("connection already registered: {0}")]
    DuplicateConnection(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("blob path rejected: {0}")]
    BlobPath(String),

    #[error("blob I/O error on {path}: {source}")]
    BlobIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("router stopped")]
    Stopped,

    #[error("transport error: {0}")]
    Transport(#[from] rhizome_transport::TransportError),

    #[error("core protocol error: {0}")]
    Core(#[from] rhizome_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
