//! Transport connectors
//!
//! The client opens its transport through a [`Connector`], which also says
//! whether the environment can run a client at all.

use async_trait::async_trait;
use rhizome_transport::{Transport, TransportReceiver, TransportSender, WebSocketTransport};
use std::sync::Arc;

use crate::error::Result;

/// Opens the transport a client talks over
#[async_trait]
pub trait Connector: Send + Sync {
    /// Whether the required transport is available here
    fn is_supported(&self) -> bool {
        true
    }

    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportSender>, Box<dyn TransportReceiver>)>;
}

/// WebSocket connector
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn TransportSender>, Box<dyn TransportReceiver>)> {
        let (sender, receiver) = WebSocketTransport::connect(url).await?;
        Ok((Arc::new(sender), Box::new(receiver)))
    }
}
