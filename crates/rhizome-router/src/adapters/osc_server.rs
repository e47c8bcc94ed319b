//! OSC server adapter
//!
//! OSC is connectionless, so every UDP endpoint the router hears from is
//! tracked as a connection of its own. Endpoints listed in the configuration
//! are registered up front and kept for the router's lifetime, so they can
//! subscribe and receive before they ever send anything. Other endpoints are
//! registered on their first packet and dropped after a period of silence,
//! unless they hold subscriptions. An endpoint the router closed is
//! registered again on its next packet.
//!
//! Packets are decoded with the rhizome codec; bundles are flattened and
//! their messages dispatched in order.

use dashmap::DashMap;
use parking_lot::RwLock;
use rhizome_core::codec;
use rhizome_transport::{TransportEvent, UdpTransport};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::connection::{ConnectionId, OscConnection, OSC_ID_PREFIX};
use crate::error::Result;
use crate::router::{Identity, Router};

/// OSC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscServerConfig {
    /// Bind address for the UDP socket
    pub bind_addr: String,
    /// Endpoints registered at startup
    #[serde(default)]
    pub clients: Vec<SocketAddr>,
    /// Idle timeout of auto-registered endpoints without subscriptions, in
    /// seconds. 0 disables it.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

fn default_session_timeout() -> u64 {
    300
}

impl Default for OscServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", rhizome_core::DEFAULT_OSC_PORT),
            clients: Vec::new(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

impl From<&RouterConfig> for OscServerConfig {
    fn from(config: &RouterConfig) -> Self {
        Self {
            bind_addr: config.osc_bind.clone(),
            clients: config.osc_clients.clone(),
            session_timeout_secs: config.osc_session_timeout_secs,
        }
    }
}

/// A UDP endpoint known to the router
struct OscPeer {
    id: ConnectionId,
    /// Registered from configuration, never expires
    pinned: bool,
    last_seen: RwLock<Instant>,
}

impl OscPeer {
    fn new(id: ConnectionId, pinned: bool) -> Self {
        Self {
            id,
            pinned,
            last_seen: RwLock::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.write() = Instant::now();
    }

    fn idle_duration(&self) -> Duration {
        self.last_seen.read().elapsed()
    }
}

/// OSC server adapter
pub struct OscServerAdapter {
    config: OscServerConfig,
    router: Router,
    transport: UdpTransport,
    /// Peers by UDP endpoint
    peers: Arc<DashMap<SocketAddr, Arc<OscPeer>>>,
}

impl OscServerAdapter {
    /// Bind the UDP socket. Nothing is received until [`serve`](Self::serve).
    pub async fn bind(config: OscServerConfig, router: Router) -> Result<Self> {
        let transport = UdpTransport::bind(&config.bind_addr).await?;
        Ok(Self {
            config,
            router,
            transport,
            peers: Arc::new(DashMap::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Connection id used for the endpoint `addr`
    pub fn peer_id(addr: SocketAddr) -> ConnectionId {
        format!("{}{}", OSC_ID_PREFIX, addr)
    }

    /// Register the configured endpoints, then receive until the router stops
    pub async fn serve(&self) -> Result<()> {
        for client in &self.config.clients {
            self.register(*client, true).await?;
        }

        if self.config.session_timeout_secs > 0 {
            self.start_cleanup_task();
        }

        info!("OSC server listening on {}", self.local_addr()?);
        let mut receiver = self.transport.start_receiver();

        loop {
            tokio::select! {
                event = receiver.recv_from() => match event {
                    Some((TransportEvent::Data(data), from)) => {
                        self.handle_packet(from, &data).await;
                    }
                    Some(_) => {}
                    None => break,
                },
                _ = self.router.stopped() => break,
            }
        }

        Ok(())
    }

    async fn handle_packet(&self, from: SocketAddr, data: &[u8]) {
        let peer = match self.register(from, false).await {
            Ok(peer) => peer,
            Err(e) => {
                warn!("Dropping packet from {}: {}", from, e);
                return;
            }
        };
        peer.touch();

        match codec::decode_packet(data) {
            Ok(messages) => {
                for message in messages {
                    self.router.dispatch(&peer.id, message);
                }
            }
            Err(e) => {
                warn!("OSC decode error from {}: {}", from, e);
                self.router.report(&peer.id, e.to_string());
            }
        }
    }

    /// Known peer for `addr`, registering it with the router if needed
    async fn register(&self, addr: SocketAddr, mut pinned: bool) -> Result<Arc<OscPeer>> {
        if let Some(peer) = self.peers.get(&addr).map(|entry| Arc::clone(entry.value())) {
            if self.router.is_registered(&peer.id) {
                return Ok(peer);
            }
            debug!("OSC peer {} was closed by the router, registering again", addr);
            self.peers.remove(&addr);
            pinned |= peer.pinned;
        }

        let id = Self::peer_id(addr);
        let connection = Arc::new(OscConnection::new(
            Arc::new(self.transport.sender_to(addr)),
            self.router.shared_blobs(),
        ));
        self.router
            .open(connection, Identity::Fixed(id.clone()), false)
            .await?;

        let peer = Arc::new(OscPeer::new(id, pinned));
        self.peers.insert(addr, Arc::clone(&peer));
        info!(
            "OSC peer {} registered{}",
            addr,
            if pinned { " from configuration" } else { "" }
        );
        Ok(peer)
    }

    /// Drop auto-registered peers that have been silent for too long. A peer
    /// holding subscriptions is only listening and is kept.
    fn start_cleanup_task(&self) {
        let peers = Arc::clone(&self.peers);
        let router = self.router.clone();
        let timeout = Duration::from_secs(self.config.session_timeout_secs);
        let check_interval = timeout.min(Duration::from_secs(10));

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(check_interval).await;

                if !router.is_running() {
                    break;
                }

                let timed_out: Vec<SocketAddr> = peers
                    .iter()
                    .filter(|entry| !entry.value().pinned && entry.value().idle_duration() > timeout)
                    .map(|entry| *entry.key())
                    .collect();

                for addr in timed_out {
                    let Some(peer) = peers.get(&addr).map(|entry| Arc::clone(entry.value())) else {
                        continue;
                    };
                    match router.subscription_count(&peer.id).await {
                        Ok(0) => {}
                        Ok(_) => continue,
                        Err(_) => break,
                    }
                    // Only drop it if no packet arrived meanwhile
                    if peers
                        .remove_if(&addr, |_, p| p.idle_duration() > timeout)
                        .is_some()
                    {
                        info!(
                            "OSC peer {} timed out after {:?}",
                            addr,
                            peer.idle_duration()
                        );
                        router.close(&peer.id);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_router_config() {
        let router_config = RouterConfig {
            osc_bind: "127.0.0.1:9100".to_string(),
            osc_clients: vec!["127.0.0.1:9001".parse().unwrap()],
            ..Default::default()
        };
        let config = OscServerConfig::from(&router_config);
        assert_eq!(config.bind_addr, "127.0.0.1:9100");
        assert_eq!(config.clients.len(), 1);
    }

    #[test]
    fn test_peer_id() {
        let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();
        assert_eq!(OscServerAdapter::peer_id(addr), "osc:127.0.0.1:9001");
    }
}
