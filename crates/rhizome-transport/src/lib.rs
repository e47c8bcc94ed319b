//! rhizome transport layer
//!
//! This crate provides the raw transports the router and clients run on:
//! - WebSocket (browsers and the native client)
//! - UDP (OSC applications)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "udp")]
pub mod udp;

pub use error::{Result, TransportError};
pub use traits::{
    ConnectInfo, Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketReceiver, WebSocketSender, WebSocketServer, WebSocketTransport};

#[cfg(feature = "udp")]
pub use udp::{UdpReceiver, UdpSender, UdpTransport};
