//! rhizome core
//!
//! Shared primitives used by both sides of a rhizome connection:
//! - Address parsing and normalization ([`Address`])
//! - Typed message arguments ([`Arg`], [`Message`])
//! - OSC encoding/decoding ([`codec`])
//! - Reserved system addresses and the connection handshake status ([`sys`])
//! - The JSON envelope used to push blobs to WebSocket peers ([`BlobEnvelope`])

pub mod address;
pub mod codec;
pub mod error;
pub mod sys;
pub mod types;

pub use address::Address;
pub use codec::{decode, decode_packet, encode};
pub use error::{Error, Result};
pub use sys::ConnectionStatus;
pub use types::{Arg, BlobEnvelope, Message};

/// Default WebSocket port
pub const DEFAULT_WEB_PORT: u16 = 8000;

/// Default OSC (UDP) port
pub const DEFAULT_OSC_PORT: u16 = 9000;
