//! Main rhizome client implementation
//!
//! `start` opens the transport and waits for the router's connection status:
//! success carries the assigned identity, refusal means the router is full.
//! A refused client either waits in the router's queue for a later success,
//! or closes and fails.
//!
//! Every start and stop opens a new session generation. Background tasks
//! remember the generation they were spawned for and do nothing once it is
//! over, so a stopped client never reconnects.

use bytes::Bytes;
use parking_lot::Mutex;
use rhizome_core::address::validate_for_send;
use rhizome_core::sys::{CONNECTION_STATUS_ADDRESS, RESEND_ADDRESS, SUBSCRIBE_ADDRESS};
use rhizome_core::{codec, Arg, BlobEnvelope, ConnectionStatus, Message};
use rhizome_transport::{TransportEvent, TransportReceiver, TransportSender};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::ClientBuilder;
use crate::config::ClientConfig;
use crate::connector::{Connector, WebSocketConnector};
use crate::error::{ClientError, Result};
use crate::persistence::{IdentityStore, NoopStore};

/// Capacity of the event channel
const EVENT_CAPACITY: usize = 256;

/// Client status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Stopped,
    /// Transport opening or waiting for the connection status
    Connecting,
    /// Refused by a full router, waiting for a free slot
    Queued,
    Started,
}

/// Events emitted by a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Handshake completed, carries the assigned identity
    Connected(String),
    /// The transport closed without `stop` being called
    ConnectionLost,
    /// The router is full and the client is waiting for a slot
    Queued,
    /// Message pushed by the router
    Message(Message),
    Error(String),
}

struct State {
    status: ClientStatus,
    id: Option<String>,
    sender: Option<Arc<dyn TransportSender>>,
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    identity_store: Arc<dyn IdentityStore>,
    state: Mutex<State>,
    events: broadcast::Sender<ClientEvent>,
}

/// A rhizome client. Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client over WebSocket, without identity persistence
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_parts(
            config,
            Arc::new(WebSocketConnector),
            Arc::new(NoopStore),
        ))
    }

    /// Create a builder
    pub fn builder(hostname: &str, port: u16) -> ClientBuilder {
        ClientBuilder::new(hostname, port)
    }

    pub(crate) fn with_parts(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        identity_store: Arc<dyn IdentityStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                identity_store,
                state: Mutex::new(State {
                    status: ClientStatus::Stopped,
                    id: None,
                    sender: None,
                    generation: 0,
                    reconnect: None,
                }),
                events,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to client events
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> ClientStatus {
        self.inner.state.lock().status
    }

    /// Identity assigned by the router, once started
    pub fn id(&self) -> Option<String> {
        self.inner.state.lock().id.clone()
    }

    /// Connect and run the handshake, returns the assigned identity.
    ///
    /// A running connection is closed first. If the router is full and the
    /// client queues, this resolves once the router admits it; there is no
    /// timeout.
    pub async fn start(&self) -> Result<String> {
        if !self.inner.connector.is_supported() {
            return Err(ClientError::Unsupported(
                "no transport available in this environment".into(),
            ));
        }
        self.inner.config.validate()?;

        let (generation, previous) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            if let Some(handle) = state.reconnect.take() {
                handle.abort();
            }
            (state.generation, state.sender.take())
        };
        if let Some(previous) = previous {
            let _ = previous.close().await;
        }

        let id = self.inner.connect(generation).await?;
        self.inner.emit(ClientEvent::Connected(id.clone()));
        Ok(id)
    }

    /// Close the connection. Never triggers a reconnect.
    pub async fn stop(&self) -> Result<()> {
        let (sender, reconnect) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.status = ClientStatus::Stopped;
            state.id = None;
            (state.sender.take(), state.reconnect.take())
        };
        if let Some(handle) = reconnect {
            handle.abort();
        }
        if let Some(sender) = sender {
            sender.close().await?;
            info!("Client stopped");
        }
        Ok(())
    }

    /// Send a message to a user address
    pub async fn send(&self, address: &str, args: Vec<Arg>) -> Result<()> {
        validate_for_send(address)?;
        self.send_raw(address, &args).await
    }

    /// Subscribe to `address` and everything below it
    pub async fn subscribe(&self, address: &str) -> Result<()> {
        rhizome_core::Address::parse(address)?;
        self.send_raw(SUBSCRIBE_ADDRESS, &[Arg::String(address.to_string())])
            .await
    }

    /// Ask for the last message sent to `address`. The router answers at
    /// `address` itself.
    pub async fn resend(&self, address: &str) -> Result<()> {
        rhizome_core::Address::parse(address)?;
        self.send_raw(RESEND_ADDRESS, &[Arg::String(address.to_string())])
            .await
    }

    async fn send_raw(&self, address: &str, args: &[Arg]) -> Result<()> {
        let sender = self
            .inner
            .state
            .lock()
            .sender
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let data = codec::encode(address, args)?;
        sender.send(data).await?;
        Ok(())
    }
}

impl Inner {
    fn emit(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Set the status if `generation` is still running
    fn set_status(&self, generation: u64, status: ClientStatus) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.status = status;
        }
    }

    fn requested_id(&self) -> Option<String> {
        let current = self.state.lock().id.clone();
        current.or_else(|| {
            if self.config.persist_identity {
                self.identity_store.get(&self.config.identity_key)
            } else {
                None
            }
        })
    }

    /// Open the transport and run the handshake for `generation`
    async fn connect(self: &Arc<Self>, generation: u64) -> Result<String> {
        self.set_status(generation, ClientStatus::Connecting);
        let url = self.config.url(self.requested_id().as_deref());
        debug!("Connecting to {}", url);

        let (sender, mut receiver) = match self.connector.connect(&url).await {
            Ok(pair) => pair,
            Err(e) => {
                self.set_status(generation, ClientStatus::Stopped);
                return Err(ClientError::ConnectionFailed(e.to_string()));
            }
        };

        let stale = {
            let mut state = self.state.lock();
            if state.generation == generation {
                state.sender = Some(Arc::clone(&sender));
                false
            } else {
                true
            }
        };
        if stale {
            let _ = sender.close().await;
            return Err(ClientError::Stopped);
        }

        match self.handshake(generation, &sender, receiver.as_mut()).await {
            Ok(id) => {
                {
                    let mut state = self.state.lock();
                    if state.generation != generation {
                        return Err(ClientError::Stopped);
                    }
                    state.status = ClientStatus::Started;
                    state.id = Some(id.clone());
                }
                if self.config.persist_identity {
                    self.identity_store.set(&self.config.identity_key, &id);
                }
                info!("Connected as {}", id);
                self.spawn_reader(generation, receiver);
                Ok(id)
            }
            Err(e) => {
                let current = {
                    let mut state = self.state.lock();
                    if state.generation == generation {
                        state.status = ClientStatus::Stopped;
                        state.sender = None;
                        true
                    } else {
                        false
                    }
                };
                // A failed handshake never leaves the transport open
                let _ = sender.close().await;
                if current {
                    Err(e)
                } else {
                    Err(ClientError::Stopped)
                }
            }
        }
    }

    /// Wait for the connection status. Nothing is sent.
    async fn handshake(
        &self,
        generation: u64,
        sender: &Arc<dyn TransportSender>,
        receiver: &mut dyn TransportReceiver,
    ) -> Result<String> {
        loop {
            let data = match receiver.recv().await {
                Some(TransportEvent::Data(data)) => data,
                Some(TransportEvent::Disconnected { reason }) => {
                    return Err(ClientError::ConnectionFailed(
                        reason.unwrap_or_else(|| "closed during handshake".to_string()),
                    ));
                }
                None => {
                    return Err(ClientError::ConnectionFailed(
                        "closed during handshake".to_string(),
                    ));
                }
                Some(TransportEvent::Error(e)) => {
                    debug!("Transport error during handshake: {}", e);
                    continue;
                }
                Some(_) => continue,
            };

            for message in decode_or_warn(&data) {
                if message.address != CONNECTION_STATUS_ADDRESS {
                    debug!("Ignoring {} before handshake", message.address);
                    continue;
                }

                match ConnectionStatus::from_args(&message.args)? {
                    (ConnectionStatus::Success, id) => return Ok(id),
                    (ConnectionStatus::Refused, reason) if self.config.queue_if_full => {
                        info!("Router full, queued: {}", reason);
                        self.set_status(generation, ClientStatus::Queued);
                        self.emit(ClientEvent::Queued);
                    }
                    (ConnectionStatus::Refused, reason) => {
                        info!("Router full, giving up: {}", reason);
                        let _ = sender.close().await;
                        wait_closed(receiver).await;
                        return Err(ClientError::AdmissionRefused(reason));
                    }
                }
            }
        }
    }

    /// Forward router messages as events until the transport closes
    fn spawn_reader(self: &Arc<Self>, generation: u64, mut receiver: Box<dyn TransportReceiver>) {
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    TransportEvent::Data(data) => {
                        for message in decode_or_warn(&data) {
                            if message.address == CONNECTION_STATUS_ADDRESS {
                                debug!("Unexpected connection status {:?}", message.args);
                            } else {
                                inner.emit(ClientEvent::Message(message));
                            }
                        }
                    }
                    TransportEvent::Text(text) => match BlobEnvelope::from_json(&text) {
                        Ok(envelope) => inner.emit(ClientEvent::Message(envelope.into_message())),
                        Err(e) => warn!("Invalid text frame: {}", e),
                    },
                    TransportEvent::Disconnected { reason } => {
                        debug!("Transport closed: {:?}", reason);
                        break;
                    }
                    TransportEvent::Error(e) => {
                        warn!("Transport error: {}", e);
                        inner.emit(ClientEvent::Error(e));
                    }
                    TransportEvent::Connected => {}
                }
            }
            inner.on_connection_lost(generation);
        });
    }

    fn on_connection_lost(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            state.status = ClientStatus::Stopped;
            state.sender = None;
        }
        warn!("Connection lost");
        self.emit(ClientEvent::ConnectionLost);

        if self.config.reconnect_ms > 0 {
            self.schedule_reconnect(generation);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        let delay = Duration::from_millis(self.config.reconnect_ms);

        let task: Pin<Box<dyn Future<Output = ()> + Send>> = Box::pin(async move {
            tokio::time::sleep(delay).await;
            if !inner.is_current(generation) {
                return;
            }
            info!("Reconnecting");
            match inner.connect(generation).await {
                Ok(id) => inner.emit(ClientEvent::Connected(id)),
                Err(ClientError::Stopped) => {}
                Err(e) => {
                    warn!("Reconnect failed: {}", e);
                    if inner.is_current(generation) {
                        inner.schedule_reconnect(generation);
                    }
                }
            }
        });

        let handle = tokio::spawn(task);
        let mut state = self.state.lock();
        if state.generation == generation {
            state.reconnect = Some(handle);
        } else {
            handle.abort();
        }
    }
}

fn decode_or_warn(data: &Bytes) -> Vec<Message> {
    codec::decode_packet(data).unwrap_or_else(|e| {
        warn!("Decode error: {}", e);
        Vec::new()
    })
}

/// Drain the receiver until the transport reports it is closed
async fn wait_closed(receiver: &mut dyn TransportReceiver) {
    while let Some(event) = receiver.recv().await {
        if matches!(event, TransportEvent::Disconnected { .. }) {
            break;
        }
    }
}
