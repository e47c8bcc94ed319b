//! Router configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{Result, RouterError};

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Server name, used in logs
    pub name: String,
    /// Directory blobs are stored in and served from
    pub blobs_dir: PathBuf,
    /// Maximum number of handshake (WebSocket) connections, 0 for unlimited.
    /// OSC peers are not counted.
    pub max_connections: usize,
    /// Bind address of the WebSocket leg
    pub web_bind: String,
    /// Bind address of the OSC leg
    pub osc_bind: String,
    /// OSC peers registered at startup, kept for the router's lifetime
    pub osc_clients: Vec<SocketAddr>,
    /// Idle time after which an auto-registered OSC peer without
    /// subscriptions is dropped, 0 keeps them forever
    pub osc_session_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            name: "rhizome".to_string(),
            blobs_dir: std::env::temp_dir().join("rhizome-blobs"),
            max_connections: 0,
            web_bind: format!("0.0.0.0:{}", rhizome_core::DEFAULT_WEB_PORT),
            osc_bind: format!("0.0.0.0:{}", rhizome_core::DEFAULT_OSC_PORT),
            osc_clients: Vec::new(),
            osc_session_timeout_secs: 300,
        }
    }
}

impl RouterConfig {
    /// Check the configuration before any listener is bound
    pub fn validate(&self) -> Result<()> {
        if self.blobs_dir.as_os_str().is_empty() {
            return Err(RouterError::Config("blobs_dir must not be empty".into()));
        }

        for (field, value) in [("web_bind", &self.web_bind), ("osc_bind", &self.osc_bind)] {
            value.parse::<SocketAddr>().map_err(|e| {
                RouterError::Config(format!("invalid {} '{}': {}", field, value, e))
            })?;
        }

        if let Some(client) = self.osc_clients.iter().find(|c| c.port() == 0) {
            return Err(RouterError::Config(format!(
                "OSC client {} has no port",
                client
            )));
        }

        Ok(())
    }

    /// Whether a new handshake connection would exceed the limit
    pub fn is_full(&self, handshake_connections: usize) -> bool {
        self.max_connections != 0 && handshake_connections >= self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RouterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_bind() {
        let config = RouterConfig {
            web_bind: "localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RouterError::Config(_))));
    }

    #[test]
    fn test_capacity() {
        let unlimited = RouterConfig::default();
        assert!(!unlimited.is_full(10_000));

        let limited = RouterConfig {
            max_connections: 2,
            ..Default::default()
        };
        assert!(!limited.is_full(1));
        assert!(limited.is_full(2));
    }
}
