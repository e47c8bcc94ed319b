//! Protocol adapters for the rhizome router
//!
//! The WebSocket leg is served by [`Router::serve_websocket`](crate::Router::serve_websocket)
//! directly. Adapters let peers without a handshake join the same namespace:
//!
//! - [`OscServerAdapter`] - OSC over UDP, one connection per peer endpoint
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              rhizome Router              │
//! │   namespace tree | registry | blobs      │
//! │        ▲                     ▲           │
//! │  ┌─────┴─────┐         ┌─────┴─────┐     │
//! │  │ WebSocket │         │    OSC    │     │
//! │  │  Server   │         │  Adapter  │     │
//! │  └───────────┘         └───────────┘     │
//! │     :8000                 :9000          │
//! └──────────────────────────────────────────┘
//! ```

#[cfg(feature = "osc-server")]
pub mod osc_server;

#[cfg(feature = "osc-server")]
pub use osc_server::{OscServerAdapter, OscServerConfig};
