//! Per-connection outboxes
//!
//! The router task never awaits a transport. Each registered connection gets
//! a bounded queue drained by a task of its own, so a peer that stops reading
//! only stalls itself. When its queue is full further messages to it are
//! dropped and logged.

use bytes::Bytes;
use rhizome_core::Arg;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionId, ConnectionKind};

/// Messages buffered for one connection before new ones are dropped
pub const OUTBOX_CAPACITY: usize = 1024;

enum Outgoing {
    Message { address: String, args: Vec<Arg> },
    Blob { address: String, blob: Bytes },
    /// Close the transport once everything before it went out
    Close(oneshot::Sender<()>),
    /// Answered once everything before it went out
    Flush(oneshot::Sender<()>),
}

/// Queue of messages on their way to one connection
pub(crate) struct Outbox {
    id: ConnectionId,
    kind: ConnectionKind,
    connection: Arc<dyn Connection>,
    tx: mpsc::Sender<Outgoing>,
}

impl Outbox {
    /// Start the task delivering to `connection`. The task ends when the
    /// outbox is dropped or closed.
    pub fn spawn(id: ConnectionId, connection: Arc<dyn Connection>) -> Self {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        tokio::spawn(drain(id.clone(), Arc::clone(&connection), rx));
        Self {
            id,
            kind: connection.kind(),
            connection,
            tx,
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    pub fn send(&self, address: &str, args: Vec<Arg>) {
        self.push(Outgoing::Message {
            address: address.to_string(),
            args,
        });
    }

    pub fn send_blob(&self, address: &str, blob: Bytes) {
        self.push(Outgoing::Blob {
            address: address.to_string(),
            blob,
        });
    }

    /// Close the transport after the queued messages. The returned receiver
    /// resolves once it is closed.
    pub fn close(&self) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        if let Err(rejected) = self.tx.try_send(Outgoing::Close(done)) {
            // Queue full or task gone: close right away instead
            let connection = Arc::clone(&self.connection);
            let id = self.id.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.close().await {
                    debug!("Closing {} failed: {}", id, e);
                }
                if let Outgoing::Close(done) = rejected.into_inner() {
                    let _ = done.send(());
                }
            });
        }
        rx
    }

    /// Resolves once everything queued so far went out. `None` if the
    /// connection cannot take more.
    pub fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let (done, rx) = oneshot::channel();
        self.tx.try_send(Outgoing::Flush(done)).ok().map(|_| rx)
    }

    fn push(&self, outgoing: Outgoing) {
        match self.tx.try_send(outgoing) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Outbox of {} full, dropping message", self.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbox of {} closed, dropping message", self.id);
            }
        }
    }
}

async fn drain(
    id: ConnectionId,
    connection: Arc<dyn Connection>,
    mut rx: mpsc::Receiver<Outgoing>,
) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Message { address, args } => {
                if let Err(e) = connection.send(&address, &args).await {
                    warn!("Delivery of {} to {} failed: {}", address, id, e);
                }
            }
            Outgoing::Blob { address, blob } => {
                if let Err(e) = connection.send_blob(&address, blob).await {
                    warn!("Blob delivery of {} to {} failed: {}", address, id, e);
                }
            }
            Outgoing::Close(done) => {
                if let Err(e) = connection.close().await {
                    debug!("Closing {} failed: {}", id, e);
                }
                let _ = done.send(());
                break;
            }
            Outgoing::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Outbox of {} finished", id);
}
