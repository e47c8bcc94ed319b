//! Client builder pattern

use std::sync::Arc;

use crate::{Client, ClientConfig, Connector, IdentityStore, NoopStore, Result, WebSocketConnector};

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    identity_store: Arc<dyn IdentityStore>,
}

impl ClientBuilder {
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            config: ClientConfig::new(hostname, port),
            connector: Arc::new(WebSocketConnector),
            identity_store: Arc::new(NoopStore),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            connector: Arc::new(WebSocketConnector),
            identity_store: Arc::new(NoopStore),
        }
    }

    /// Reconnect delay in milliseconds, 0 disables reconnection
    pub fn reconnect_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_ms = ms;
        self
    }

    /// Queue instead of failing when the router is full
    pub fn queue_if_full(mut self, enabled: bool) -> Self {
        self.config.queue_if_full = enabled;
        self
    }

    pub fn identity_key(mut self, key: &str) -> Self {
        self.config.identity_key = key.to_string();
        self
    }

    pub fn persist_identity(mut self, enabled: bool) -> Self {
        self.config.persist_identity = enabled;
        self
    }

    /// Use a different transport
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Where the assigned identity is persisted
    pub fn identity_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.identity_store = store;
        self
    }

    /// Validate the configuration and build a stopped client
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        Ok(Client::with_parts(
            self.config,
            self.connector,
            self.identity_store,
        ))
    }

    /// Build and start
    pub async fn start(self) -> Result<Client> {
        let client = self.build()?;
        client.start().await?;
        Ok(client)
    }
}
