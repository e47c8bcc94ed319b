//! Common test helpers and utilities for rhizome tests
//!
//! - Condition-based waiting (no hardcoded sleeps)
//! - Test router management with RAII cleanup
//! - Raw WebSocket and OSC peers speaking the wire format directly
//! - A recording connection for driving the router without sockets

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rhizome_client::{Client, ClientBuilder};
use rhizome_core::{codec, Arg, BlobEnvelope, Message};
use rhizome_router::{
    Connection, ConnectionKind, OscServerAdapter, OscServerConfig, Router, RouterConfig,
};
use rhizome_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, UdpReceiver, UdpTransport,
    WebSocketReceiver, WebSocketSender, WebSocketTransport,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::time::timeout;

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Port Allocation
// ============================================================================

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout - condition-based, not time-based
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

// ============================================================================
// Test Router - RAII wrapper with proper cleanup
// ============================================================================

/// A router serving WebSocket and OSC on local ports, with its own blob
/// directory. Everything is torn down on drop.
pub struct TestRouter {
    router: Router,
    port: u16,
    osc_addr: SocketAddr,
    handles: Vec<tokio::task::JoinHandle<()>>,
    _blobs_dir: TempDir,
}

impl TestRouter {
    /// Start a test router with default configuration
    pub async fn start() -> Self {
        Self::start_with_config(RouterConfig::default()).await
    }

    /// Start a test router; bind addresses and blob directory are replaced
    pub async fn start_with_config(mut config: RouterConfig) -> Self {
        let blobs_dir = tempfile::tempdir().unwrap();
        let port = find_available_port().await;
        config.name = "test-router".to_string();
        config.blobs_dir = blobs_dir.path().to_path_buf();
        config.web_bind = format!("127.0.0.1:{}", port);
        config.osc_bind = "127.0.0.1:0".to_string();

        let router = Router::new(config.clone()).unwrap();

        let osc = OscServerAdapter::bind(OscServerConfig::from(&config), router.clone())
            .await
            .unwrap();
        let osc_addr = osc.local_addr().unwrap();

        let web = router.clone();
        let web_bind = config.web_bind.clone();
        let handles = vec![
            tokio::spawn(async move {
                let _ = web.serve_websocket(&web_bind).await;
            }),
            tokio::spawn(async move {
                let _ = osc.serve().await;
            }),
        ];

        let listening = wait_for(
            || async move {
                tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port))
                    .await
                    .is_ok()
            },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;
        assert!(listening, "test router did not start listening");

        Self {
            router,
            port,
            osc_addr,
            handles,
            _blobs_dir: blobs_dir,
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get the WebSocket URL for this router
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address of the OSC leg
    pub fn osc_addr(&self) -> SocketAddr {
        self.osc_addr
    }

    pub fn blobs_dir(&self) -> &Path {
        self.router.blobs().root()
    }

    /// Client builder pointed at this router, reconnection off
    pub fn client_builder(&self) -> ClientBuilder {
        Client::builder("127.0.0.1", self.port).reconnect_ms(0)
    }

    /// Wait until the router has `count` registered connections
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        let router = &self.router;
        wait_for(
            || async move { router.connection_count().await.ok() == Some(count) },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Stop the router explicitly (also happens on drop)
    pub async fn stop(&mut self) {
        self.router.stop().await;
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TestRouter {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

// ============================================================================
// Raw peers
// ============================================================================

/// WebSocket peer speaking the wire format directly, without the client's
/// handshake logic
pub struct WsTestPeer {
    sender: WebSocketSender,
    receiver: WebSocketReceiver,
}

impl WsTestPeer {
    pub async fn connect(url: &str) -> Self {
        let (sender, receiver) = WebSocketTransport::connect(url).await.unwrap();
        Self { sender, receiver }
    }

    pub async fn send(&self, address: &str, args: Vec<Arg>) {
        let data = codec::encode(address, &args).unwrap();
        self.sender.send(data).await.unwrap();
    }

    /// Next message, binary OSC or JSON blob envelope
    pub async fn recv(&mut self) -> Option<Message> {
        self.recv_timeout(DEFAULT_TIMEOUT).await
    }

    pub async fn recv_timeout(&mut self, max_wait: Duration) -> Option<Message> {
        let deadline = Instant::now() + max_wait;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match timeout(remaining, self.receiver.recv()).await.ok()?? {
                TransportEvent::Data(data) => return codec::decode(&data).ok(),
                TransportEvent::Text(text) => {
                    return BlobEnvelope::from_json(&text).ok().map(|e| e.into_message())
                }
                TransportEvent::Disconnected { .. } => return None,
                _ => continue,
            }
        }
    }

    /// Wait until the router closes the connection
    pub async fn wait_closed(&mut self) -> bool {
        let wait = async {
            while let Some(event) = self.receiver.recv().await {
                if matches!(event, TransportEvent::Disconnected { .. }) {
                    return;
                }
            }
        };
        timeout(DEFAULT_TIMEOUT, wait).await.is_ok()
    }

    pub async fn close(&self) {
        let _ = self.sender.close().await;
    }
}

/// OSC application stand-in on a local UDP port
pub struct OscTestPeer {
    transport: UdpTransport,
    receiver: UdpReceiver,
    router: SocketAddr,
}

impl OscTestPeer {
    pub async fn bind(router: SocketAddr) -> Self {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver = transport.start_receiver();
        Self {
            transport,
            receiver,
            router,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr().unwrap()
    }

    pub async fn send(&self, address: &str, args: Vec<Arg>) {
        let data = codec::encode(address, &args).unwrap();
        self.send_raw(&data).await;
    }

    /// Send bytes as they are, valid OSC or not
    pub async fn send_raw(&self, data: &[u8]) {
        self.transport.send_to(data, self.router).await.unwrap();
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.recv_timeout(DEFAULT_TIMEOUT).await
    }

    pub async fn recv_timeout(&mut self, max_wait: Duration) -> Option<Message> {
        let deadline = Instant::now() + max_wait;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match timeout(remaining, self.receiver.recv_from()).await.ok()?? {
                (TransportEvent::Data(data), _) => return codec::decode(&data).ok(),
                _ => continue,
            }
        }
    }

    /// Receive until a message at `address` shows up
    pub async fn recv_at(&mut self, address: &str) -> Option<Message> {
        loop {
            let message = self.recv().await?;
            if message.address == address {
                return Some(message);
            }
        }
    }
}

// ============================================================================
// Recording connection
// ============================================================================

/// Connection that records what the router pushes to it. Blobs are
/// recorded as pushed whatever the kind; turning them into files is up to
/// [`OscConnection`](rhizome_router::OscConnection).
pub struct RecordingConnection {
    kind: ConnectionKind,
    messages: Mutex<Vec<Message>>,
    blobs: Mutex<Vec<(String, Bytes)>>,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new(kind: ConnectionKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            messages: Mutex::new(Vec::new()),
            blobs: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn websocket() -> Arc<Self> {
        Self::new(ConnectionKind::WebSocket)
    }

    pub fn osc() -> Arc<Self> {
        Self::new(ConnectionKind::Osc)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Recorded messages at `address`
    pub fn messages_at(&self, address: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.address == address)
            .cloned()
            .collect()
    }

    pub fn blobs(&self) -> Vec<(String, Bytes)> {
        self.blobs.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait until `count` messages have been recorded at `address`
    pub async fn wait_for_messages_at(&self, address: &str, count: usize) -> bool {
        wait_for(
            || async move { self.messages_at(address).len() >= count },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Wait until the router closed this connection
    pub async fn wait_closed(&self) -> bool {
        wait_for(
            || async move { self.is_closed() },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }

    /// Wait until `count` blobs have been recorded
    pub async fn wait_for_blobs(&self, count: usize) -> bool {
        wait_for(
            || async move { self.blobs.lock().len() >= count },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn kind(&self) -> ConnectionKind {
        self.kind
    }

    async fn send(&self, address: &str, args: &[Arg]) -> rhizome_router::Result<()> {
        self.messages
            .lock()
            .push(Message::new(address, args.to_vec()));
        Ok(())
    }

    async fn send_blob(&self, address: &str, blob: Bytes) -> rhizome_router::Result<()> {
        self.blobs.lock().push((address.to_string(), blob));
        Ok(())
    }

    async fn close(&self) -> rhizome_router::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
