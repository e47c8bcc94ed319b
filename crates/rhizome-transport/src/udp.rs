//! UDP transport
//!
//! OSC peers have no connection: one socket serves every peer, the
//! receiver reports the source of each datagram and a [`UdpSender`] is just
//! the shared socket pinned to one remote endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Largest payload a single UDP datagram can carry
pub const MAX_PACKET_SIZE: usize = 65507;

/// Datagrams buffered between the socket task and the consumer
const RECV_QUEUE: usize = 256;

/// Pause after a first receive error, doubled on each error in a row
const ERROR_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ERROR_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after the `errors`-th receive error in a row
fn error_backoff(errors: u32) -> Duration {
    let shift = errors.saturating_sub(1).min(16);
    ERROR_BACKOFF_BASE
        .saturating_mul(1 << shift)
        .min(ERROR_BACKOFF_MAX)
}

fn check_size(len: usize) -> Result<()> {
    if len > MAX_PACKET_SIZE {
        return Err(TransportError::SendFailed(format!(
            "datagram of {} bytes exceeds the UDP limit of {}",
            len, MAX_PACKET_SIZE
        )));
    }
    Ok(())
}

/// A bound UDP socket shared by all peers
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("bind {}: {}", addr, e)))?;
        info!("UDP socket bound to {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender for one remote endpoint, sharing this socket
    pub fn sender_to(&self, remote: SocketAddr) -> UdpSender {
        UdpSender {
            socket: Arc::clone(&self.socket),
            remote,
            open: AtomicBool::new(true),
        }
    }

    /// Spawn the receive task. Each call starts a new task reading the
    /// same socket, so call it once.
    pub fn start_receiver(&self) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(RECV_QUEUE);
        tokio::spawn(receive_loop(Arc::clone(&self.socket), tx));
        UdpReceiver { rx }
    }

    /// Send one datagram to `target`
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        check_size(data.len())?;
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", target, e)))?;
        Ok(())
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<(TransportEvent, SocketAddr)>) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let mut errors = 0u32;
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                errors = 0;
                debug!("UDP {} bytes from {}", len, from);
                let data = Bytes::copy_from_slice(&buf[..len]);
                if tx.send((TransportEvent::Data(data), from)).await.is_err() {
                    break;
                }
            }
            // An unreachable peer shows up here on some platforms, the
            // socket itself is still fine. A persistent error is retried
            // ever more slowly.
            Err(e) => {
                errors = errors.saturating_add(1);
                let pause = error_backoff(errors);
                warn!("UDP receive error, retrying in {:?}: {}", pause, e);
                tokio::time::sleep(pause).await;
                if tx.is_closed() {
                    break;
                }
            }
        }
    }
    debug!("UDP receive task finished");
}

/// Sends to one remote endpoint. Closing only stops this sender.
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    open: AtomicBool,
}

impl UdpSender {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        check_size(data.len())?;
        self.socket
            .send_to(&data, self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(format!("{}: {}", self.remote, e)))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

/// Datagrams from every peer, tagged with their source
pub struct UdpReceiver {
    rx: mpsc::Receiver<(TransportEvent, SocketAddr)>,
}

impl UdpReceiver {
    pub async fn recv_from(&mut self) -> Option<(TransportEvent, SocketAddr)> {
        self.rx.recv().await
    }
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await.map(|(event, _)| event)
    }
}
