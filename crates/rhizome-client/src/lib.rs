//! rhizome client library
//!
//! Async client for a rhizome router over WebSocket. Runs the rhizome-level
//! handshake, waits in the router's admission queue when it is full, and
//! reconnects after an unexpected loss.
//!
//! # Example
//!
//! ```no_run
//! use rhizome_client::{Client, ClientEvent};
//!
//! #[tokio::main]
//! async fn main() -> rhizome_client::Result<()> {
//!     let client = Client::builder("localhost", 8000).reconnect_ms(1000).build()?;
//!     let mut events = client.events();
//!
//!     let id = client.start().await?;
//!     println!("connected as {}", id);
//!
//!     client.subscribe("/bla").await?;
//!     client.send("/bla/bli", vec![1.into(), "toitoi".into()]).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let ClientEvent::Message(msg) = event {
//!             println!("{} {:?}", msg.address, msg.args);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod persistence;

pub use builder::ClientBuilder;
pub use client::{Client, ClientEvent, ClientStatus};
pub use config::ClientConfig;
pub use connector::{Connector, WebSocketConnector};
pub use error::{ClientError, Result};
pub use persistence::{IdentityStore, MemoryStore, NoopStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::client::{Client, ClientEvent, ClientStatus};
    pub use crate::builder::ClientBuilder;
    pub use crate::error::{ClientError, Result};
    pub use rhizome_core::{Arg, Message};
}
