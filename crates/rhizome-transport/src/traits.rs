//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::{Result, TransportError};

/// Events that can occur on a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established
    Connected,
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Binary data received
    Data(Bytes),
    /// Text frame received
    Text(String),
    /// Error occurred
    Error(String),
}

/// Trait for sending data
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send binary data
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Send a text frame. Transports without text frames refuse it.
    async fn send_text(&self, _text: String) -> Result<()> {
        Err(TransportError::Protocol(
            "text frames not supported".to_string(),
        ))
    }

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the sender
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving data
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Main transport trait
#[async_trait]
pub trait Transport: Send + Sync {
    /// The sender type for this transport
    type Sender: TransportSender;
    /// The receiver type for this transport
    type Receiver: TransportReceiver;

    /// Connect to a remote endpoint
    async fn connect(addr: &str) -> Result<(Self::Sender, Self::Receiver)>
    where
        Self: Sized;
}

/// What a server learns about a peer while accepting it
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    /// Remote address
    pub addr: SocketAddr,
    /// Query parameters of the connect request, if the transport has any
    pub query: HashMap<String, String>,
}

impl ConnectInfo {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            query: HashMap::new(),
        }
    }

    /// Look up a query parameter
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|s| s.as_str())
    }
}

/// Trait for transport servers (listeners)
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// The sender type for accepted connections
    type Sender: TransportSender;
    /// The receiver type for accepted connections
    type Receiver: TransportReceiver;

    /// Accept a new connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, ConnectInfo)>;

    /// Get the local address
    fn local_addr(&self) -> Result<SocketAddr>;
}
