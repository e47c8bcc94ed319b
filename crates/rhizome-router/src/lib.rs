//! rhizome router
//!
//! The router is the central hub of a rhizome session:
//! - Keeps the namespace tree of subscriptions and retained messages
//! - Registers connections and runs admission control
//! - Routes messages to every subscriber on the address path
//! - Relays blobs through the configured blob directory
//!
//! # Transport Support
//!
//! - **WebSocket**: browsers and the native client, with a rhizome-level
//!   handshake assigning identities
//! - **OSC over UDP**: creative-coding and audio tools, one connection per
//!   UDP peer
//!
//! # Example
//!
//! ```no_run
//! use rhizome_router::{Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new(RouterConfig::default())?;
//!     router.serve_websocket("0.0.0.0:8000").await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod blob;
pub mod config;
pub mod connection;
pub mod error;
mod outbox;
pub mod router;
pub mod tree;

pub use blob::BlobStore;
pub use config::RouterConfig;
pub use connection::{
    Connection, ConnectionId, ConnectionKind, OscConnection, WebSocketConnection, OSC_ID_PREFIX,
};
pub use error::{Result, RouterError};
pub use router::{Admission, AdmissionState, Identity, Router};
pub use tree::NamespaceTree;

#[cfg(feature = "osc-server")]
pub use adapters::{OscServerAdapter, OscServerConfig};
