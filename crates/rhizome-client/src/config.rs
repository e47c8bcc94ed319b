//! Client configuration

use crate::error::{ClientError, Result};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Router host
    pub hostname: String,
    /// Router WebSocket port
    pub port: u16,
    /// Delay before reconnecting after a lost connection, 0 disables it
    pub reconnect_ms: u64,
    /// Wait in the router's queue instead of failing when it is full
    pub queue_if_full: bool,
    /// Key the identity is persisted under
    pub identity_key: String,
    /// Save the assigned identity and ask for it again on the next start
    pub persist_identity: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: rhizome_core::DEFAULT_WEB_PORT,
            reconnect_ms: 1000,
            queue_if_full: true,
            identity_key: "rhizome".to_string(),
            persist_identity: true,
        }
    }
}

impl ClientConfig {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(ClientError::InvalidConfig("hostname must not be empty".into()));
        }
        if self
            .hostname
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(ClientError::InvalidConfig(format!(
                "invalid hostname '{}'",
                self.hostname
            )));
        }
        if self.port == 0 {
            return Err(ClientError::InvalidConfig("port must not be 0".into()));
        }
        if self.persist_identity && self.identity_key.is_empty() {
            return Err(ClientError::InvalidConfig(
                "identity_key must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Connect URL, carrying the admission policy, the identity to reuse
    /// and a description of the environment
    pub fn url(&self, id: Option<&str>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("queueIfFull", if self.queue_if_full { "true" } else { "false" });
        if let Some(id) = id {
            query.append_pair("id", id);
        }
        query.append_pair("os", std::env::consts::OS);
        query.append_pair(
            "agent",
            concat!("rhizome-client/", env!("CARGO_PKG_VERSION")),
        );
        format!("ws://{}:{}/?{}", self.hostname, self.port, query.finish())
    }
}
