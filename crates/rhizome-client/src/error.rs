//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("unsupported environment: {0}")]
    Unsupported(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("admission refused: {0}")]
    AdmissionRefused(String),

    #[error("not connected")]
    NotConnected,

    #[error("client stopped")]
    Stopped,

    #[error("protocol error: {0}")]
    Protocol(#[from] rhizome_core::Error),

    #[error("transport error: {0}")]
    Transport(#[from] rhizome_transport::TransportError),
}
