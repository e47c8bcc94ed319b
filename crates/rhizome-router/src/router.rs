//! Main router implementation
//!
//! Every connection runs in its own task and feeds a single router task over
//! a channel. The router task owns the namespace tree and the connection
//! registry, so a send is retained and queued for every subscriber before
//! the next message is looked at. Delivery itself happens in one outbox task
//! per connection. Blob file I/O runs in background tasks whose results
//! re-enter the router task as ordinary commands.
//!
//! # Example
//!
//! ```no_run
//! use rhizome_router::{Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::new(RouterConfig::default()).unwrap();
//!
//!     // WebSocket (browsers and native clients)
//!     router.serve_websocket("0.0.0.0:8000").await.unwrap();
//!
//!     // Or use any TransportServer implementation
//!     // router.serve_on(my_custom_server).await.unwrap();
//! }
//! ```

use bytes::Bytes;
use dashmap::DashMap;
use rhizome_core::address::validate_for_send;
use rhizome_core::sys::{
    CONNECTION_STATUS_ADDRESS, ERROR_ADDRESS, FROM_BLOB_ADDRESS, GIMME_BLOB_ADDRESS,
    RESEND_ADDRESS, SEND_BLOB_ADDRESS, SUBSCRIBED_ADDRESS, SUBSCRIBE_ADDRESS, BLOB_SEGMENT,
};
use rhizome_core::{codec, Address, Arg, BlobEnvelope, ConnectionStatus, Message};
use rhizome_transport::{
    ConnectInfo, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[cfg(feature = "websocket")]
use rhizome_transport::WebSocketServer;

use crate::blob::BlobStore;
use crate::config::RouterConfig;
use crate::connection::{
    Connection, ConnectionId, ConnectionKind, WebSocketConnection, OSC_ID_PREFIX,
};
use crate::error::{Result, RouterError};
use crate::outbox::Outbox;
use crate::tree::NamespaceTree;

/// Payload of the refusal status sent when capacity is reached
const SERVER_FULL: &str = "the server is full";

/// How long [`Router::stop`] waits for transports to close
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// How the router should identify a new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Use exactly this id, fails if it is taken
    Fixed(ConnectionId),
    /// Reuse the requested id if nobody holds it and it is not an OSC id,
    /// otherwise assign a new one
    Requested(Option<ConnectionId>),
}

/// Outcome of [`Router::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    Admitted,
    /// Waiting for a free slot, admitted later without further action
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub id: ConnectionId,
    pub state: AdmissionState,
}

enum Command {
    Open {
        connection: Arc<dyn Connection>,
        identity: Identity,
        queue_if_full: bool,
        done: oneshot::Sender<Result<Admission>>,
    },
    Close {
        id: ConnectionId,
    },
    Disconnect {
        id: ConnectionId,
    },
    Message {
        from: ConnectionId,
        message: Message,
    },
    /// Result of a blob write, already validated
    Publish {
        address: Address,
        args: Vec<Arg>,
    },
    /// Result of a blob read, already validated
    PublishBlob {
        address: Address,
        blob: Bytes,
    },
    Report {
        to: ConnectionId,
        error: String,
    },
    Query(Query),
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

enum Query {
    ConnectionCount(oneshot::Sender<usize>),
    QueuedCount(oneshot::Sender<usize>),
    Retained(Address, oneshot::Sender<Vec<Arg>>),
    Subscribers(Address, oneshot::Sender<Vec<ConnectionId>>),
    DeliverySet(Address, oneshot::Sender<Vec<ConnectionId>>),
    SubscriptionCount(ConnectionId, oneshot::Sender<usize>),
    Flush(oneshot::Sender<()>),
}

/// Handle to a running router. Cheap to clone; all clones drive the same
/// router task.
#[derive(Clone)]
pub struct Router {
    config: Arc<RouterConfig>,
    blobs: Arc<BlobStore>,
    registered: Arc<DashMap<ConnectionId, ConnectionKind>>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Router {
    /// Validate `config`, open the blob directory and start the router task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        let blobs = Arc::new(BlobStore::open(&config.blobs_dir)?);
        let config = Arc::new(config);

        let registered = Arc::new(DashMap::new());

        let (tx, rx) = mpsc::unbounded_channel();
        let core = RouterCore {
            config: Arc::clone(&config),
            tree: NamespaceTree::new(),
            connections: HashMap::new(),
            waiting: VecDeque::new(),
            registered: Arc::clone(&registered),
            blobs: Arc::clone(&blobs),
            commands: tx.downgrade(),
        };
        tokio::spawn(core.run(rx));

        let (shutdown, _) = watch::channel(false);
        info!("Router '{}' started", config.name);

        Ok(Self {
            config,
            blobs,
            registered,
            commands: tx,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub(crate) fn shared_blobs(&self) -> Arc<BlobStore> {
        Arc::clone(&self.blobs)
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow() && !self.commands.is_closed()
    }

    // =========================================================================
    // Connection Registry
    // =========================================================================

    /// Register a connection.
    ///
    /// Connections that require the handshake have their connection status
    /// queued ahead of anything else sent to them. A refused connection that
    /// did not ask to queue gets [`RouterError::ServerFull`] and is closed
    /// once the refusal went out.
    pub async fn open(
        &self,
        connection: Arc<dyn Connection>,
        identity: Identity,
        queue_if_full: bool,
    ) -> Result<Admission> {
        let (done, rx) = oneshot::channel();
        self.send(Command::Open {
            connection,
            identity,
            queue_if_full,
            done,
        })?;
        rx.await.map_err(|_| RouterError::Stopped)?
    }

    /// Unregister a connection and drop its subscriptions
    pub fn close(&self, id: &str) {
        let _ = self.send(Command::Close { id: id.to_string() });
    }

    /// Close the transport of a connection, then unregister it
    pub fn disconnect(&self, id: &str) {
        let _ = self.send(Command::Disconnect { id: id.to_string() });
    }

    /// Hand a decoded message from `from` to the router
    pub fn dispatch(&self, from: &str, message: Message) {
        let _ = self.send(Command::Message {
            from: from.to_string(),
            message,
        });
    }

    /// Send an error report to `to`
    pub fn report(&self, to: &str, error: impl Into<String>) {
        let _ = self.send(Command::Report {
            to: to.to_string(),
            error: error.into(),
        });
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether `id` is registered right now, queued connections excluded.
    /// Answers without going through the router task.
    pub fn is_registered(&self, id: &str) -> bool {
        self.registered.contains_key(id)
    }

    /// Number of registered connections, queued ones excluded
    pub async fn connection_count(&self) -> Result<usize> {
        self.query(Query::ConnectionCount).await
    }

    /// Number of connections waiting for a free slot
    pub async fn queued_count(&self) -> Result<usize> {
        self.query(Query::QueuedCount).await
    }

    /// Last message sent to `address`, empty if there is none
    pub async fn retained(&self, address: &str) -> Result<Vec<Arg>> {
        let address = Address::parse(address)?;
        self.query(|tx| Query::Retained(address, tx)).await
    }

    /// Connections subscribed exactly at `address`
    pub async fn subscribers(&self, address: &str) -> Result<Vec<ConnectionId>> {
        let address = Address::parse(address)?;
        self.query(|tx| Query::Subscribers(address, tx)).await
    }

    /// Connections a message sent to `address` would be delivered to
    pub async fn delivery_set(&self, address: &str) -> Result<Vec<ConnectionId>> {
        let address = Address::parse(address)?;
        self.query(|tx| Query::DeliverySet(address, tx)).await
    }

    /// Number of addresses `id` is subscribed at
    pub async fn subscription_count(&self, id: &str) -> Result<usize> {
        let id = id.to_string();
        self.query(|tx| Query::SubscriptionCount(id, tx)).await
    }

    /// Resolves once everything dispatched before has been handled and
    /// handed to the transports. A peer that stopped reading holds it up;
    /// one whose outbox is already full is skipped.
    pub async fn flush(&self) -> Result<()> {
        self.query(Query::Flush).await
    }

    /// Close every connection and stop the router task and the listeners
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let (done, rx) = oneshot::channel();
        if self.send(Command::Shutdown { done }).is_ok() {
            let _ = rx.await;
        }
        info!("Router '{}' stopped", self.config.name);
    }

    /// Resolves once [`Router::stop`] has been called
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RouterError::Stopped)
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Query(make(tx)))?;
        rx.await.map_err(|_| RouterError::Stopped)
    }

    // =========================================================================
    // Transport-Agnostic Serving
    // =========================================================================

    /// Serve handshake connections from any TransportServer implementation.
    ///
    /// Returns once the router is stopped.
    pub async fn serve_on<S>(&self, mut server: S) -> Result<()>
    where
        S: TransportServer + 'static,
        S::Sender: 'static,
        S::Receiver: 'static,
    {
        info!("Router accepting connections on {}", server.local_addr()?);
        let mut stopped = self.shutdown.subscribe();

        loop {
            if *stopped.borrow_and_update() {
                break;
            }
            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok((sender, receiver, info)) => {
                        debug!("New connection from {}", info.addr);
                        self.handle_connection(Arc::new(sender), receiver, info);
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = stopped.changed() => {}
            }
        }

        Ok(())
    }

    /// Start the WebSocket leg
    #[cfg(feature = "websocket")]
    pub async fn serve_websocket(&self, addr: &str) -> Result<()> {
        let server = WebSocketServer::bind(addr).await?;
        info!("WebSocket server listening on {}", addr);
        self.serve_on(server).await
    }

    /// Run one WebSocket peer: handshake, then decode its frames until it
    /// goes away
    fn handle_connection(
        &self,
        sender: Arc<dyn TransportSender>,
        mut receiver: impl TransportReceiver + 'static,
        info: ConnectInfo,
    ) {
        let router = self.clone();

        tokio::spawn(async move {
            let queue_if_full = info.param("queueIfFull") == Some("true");
            let requested = info
                .param("id")
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            debug!(
                os = ?info.param("os"),
                agent = ?info.param("agent"),
                "Handshake from {}",
                info.addr
            );

            let connection = Arc::new(WebSocketConnection::new(Arc::clone(&sender)));
            let id = match router
                .open(connection, Identity::Requested(requested), queue_if_full)
                .await
            {
                Ok(admission) => admission.id,
                Err(e) => {
                    info!("Refusing {}: {}", info.addr, e);
                    // A full router closes after sending the refusal itself
                    if !matches!(e, RouterError::ServerFull(_)) {
                        let _ = sender.close().await;
                    }
                    return;
                }
            };

            while let Some(event) = receiver.recv().await {
                match event {
                    TransportEvent::Data(data) => match codec::decode_packet(&data) {
                        Ok(messages) => {
                            for message in messages {
                                router.dispatch(&id, message);
                            }
                        }
                        Err(e) => {
                            warn!("Decode error from {}: {}", id, e);
                            router.report(&id, e.to_string());
                        }
                    },
                    TransportEvent::Text(text) => match BlobEnvelope::from_json(&text) {
                        Ok(envelope) => router.dispatch(&id, envelope.into_message()),
                        Err(e) => {
                            warn!("Unexpected text frame from {}: {}", id, e);
                            router.report(&id, e.to_string());
                        }
                    },
                    TransportEvent::Disconnected { reason } => {
                        info!("Connection {} disconnected: {:?}", id, reason);
                        break;
                    }
                    TransportEvent::Error(e) => {
                        debug!("Transport error from {}: {}", id, e);
                    }
                    TransportEvent::Connected => {}
                }
            }

            router.close(&id);
        });
    }
}

/// State owned by the router task
struct RouterCore {
    config: Arc<RouterConfig>,
    tree: NamespaceTree,
    connections: HashMap<ConnectionId, Outbox>,
    /// Connections waiting for a free slot, in arrival order
    waiting: VecDeque<(ConnectionId, Outbox)>,
    /// Read-only view of `connections` for other tasks
    registered: Arc<DashMap<ConnectionId, ConnectionKind>>,
    blobs: Arc<BlobStore>,
    /// Re-entry point for background blob tasks
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl RouterCore {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Shutdown { done } => {
                    self.shutdown().await;
                    let _ = done.send(());
                    break;
                }
                command => self.handle(command),
            }
        }
        debug!("Router task finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open {
                connection,
                identity,
                queue_if_full,
                done,
            } => {
                let result = self.open(connection, identity, queue_if_full);
                let _ = done.send(result);
            }
            Command::Close { id } => self.close(&id),
            Command::Disconnect { id } => {
                let outbox = self
                    .connections
                    .get(&id)
                    .or_else(|| self.waiting.iter().find(|(w, _)| *w == id).map(|(_, o)| o));
                if let Some(outbox) = outbox {
                    // Whatever is queued still goes out before the close
                    drop(outbox.close());
                    self.close(&id);
                }
            }
            Command::Message { from, message } => self.on_message(from, message),
            Command::Publish { address, args } => self.publish(&address, args),
            Command::PublishBlob { address, blob } => self.publish_blob(&address, blob),
            Command::Report { to, error } => self.report(&to, error),
            Command::Query(query) => self.query(query),
            Command::Shutdown { .. } => {}
        }
    }

    fn query(&self, query: Query) {
        match query {
            Query::ConnectionCount(tx) => {
                let _ = tx.send(self.connections.len());
            }
            Query::QueuedCount(tx) => {
                let _ = tx.send(self.waiting.len());
            }
            Query::Retained(address, tx) => {
                let _ = tx.send(self.tree.retained(&address));
            }
            Query::Subscribers(address, tx) => {
                let _ = tx.send(self.tree.subscribers(&address));
            }
            Query::DeliverySet(address, tx) => {
                let _ = tx.send(self.tree.delivery_set(&address));
            }
            Query::SubscriptionCount(id, tx) => {
                let _ = tx.send(self.tree.subscription_count(&id));
            }
            Query::Flush(tx) => {
                let pending: Vec<_> = self
                    .connections
                    .values()
                    .chain(self.waiting.iter().map(|(_, o)| o))
                    .filter_map(Outbox::flush)
                    .collect();
                tokio::spawn(async move {
                    for flushed in pending {
                        let _ = flushed.await;
                    }
                    let _ = tx.send(());
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------

    fn is_known(&self, id: &str) -> bool {
        self.connections.contains_key(id) || self.waiting.iter().any(|(w, _)| w == id)
    }

    fn handshake_count(&self) -> usize {
        self.connections
            .values()
            .filter(|o| o.kind().requires_handshake())
            .count()
    }

    fn assign_id(&self, identity: Identity) -> Result<ConnectionId> {
        match identity {
            Identity::Fixed(id) if self.is_known(&id) => Err(RouterError::DuplicateConnection(id)),
            Identity::Fixed(id) => Ok(id),
            // OSC ids name a UDP endpoint, nobody else may take one
            Identity::Requested(Some(id))
                if !self.is_known(&id) && !id.starts_with(OSC_ID_PREFIX) =>
            {
                Ok(id)
            }
            Identity::Requested(_) => Ok(Uuid::new_v4().to_string()),
        }
    }

    fn open(
        &mut self,
        connection: Arc<dyn Connection>,
        identity: Identity,
        queue_if_full: bool,
    ) -> Result<Admission> {
        let id = self.assign_id(identity)?;
        let kind = connection.kind();

        if kind.requires_handshake() && self.config.is_full(self.handshake_count()) {
            let outbox = Outbox::spawn(id.clone(), connection);
            outbox.send(
                CONNECTION_STATUS_ADDRESS,
                ConnectionStatus::Refused.to_args(SERVER_FULL),
            );

            if queue_if_full {
                self.waiting.push_back((id.clone(), outbox));
                info!("Connection {} queued, {} waiting", id, self.waiting.len());
                return Ok(Admission {
                    id,
                    state: AdmissionState::Queued,
                });
            }

            info!("Connection {} refused: {}", id, SERVER_FULL);
            drop(outbox.close());
            return Err(RouterError::ServerFull(SERVER_FULL.to_string()));
        }

        self.admit(id.clone(), Outbox::spawn(id.clone(), connection));
        Ok(Admission {
            id,
            state: AdmissionState::Admitted,
        })
    }

    fn admit(&mut self, id: ConnectionId, outbox: Outbox) {
        let kind = outbox.kind();
        if kind.requires_handshake() {
            outbox.send(
                CONNECTION_STATUS_ADDRESS,
                ConnectionStatus::Success.to_args(id.clone()),
            );
        }
        info!("Connection {} ({}) opened", id, kind);
        self.registered.insert(id.clone(), kind);
        self.connections.insert(id, outbox);
    }

    fn close(&mut self, id: &str) {
        if self.connections.remove(id).is_some() {
            self.registered.remove(id);
            let dropped = self.tree.unsubscribe_all(id);
            info!(
                "Connection {} closed, {} subscriptions dropped",
                id, dropped
            );
            self.admit_waiting();
        } else if let Some(pos) = self.waiting.iter().position(|(w, _)| w == id) {
            self.waiting.remove(pos);
            debug!("Queued connection {} left", id);
        }
    }

    fn admit_waiting(&mut self) {
        while !self.config.is_full(self.handshake_count()) {
            let Some((id, outbox)) = self.waiting.pop_front() else {
                break;
            };
            self.admit(id, outbox);
        }
    }

    async fn shutdown(&mut self) {
        self.registered.clear();
        let waiting = self.waiting.drain(..).map(|(_, o)| o);
        let closed: Vec<_> = self
            .connections
            .drain()
            .map(|(_, o)| o)
            .chain(waiting)
            .map(|outbox| outbox.close())
            .collect();

        let all_closed = async {
            for done in closed {
                let _ = done.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, all_closed).await.is_err() {
            warn!("Some connections did not close within {:?}", SHUTDOWN_GRACE);
        }
    }

    // -------------------------------------------------------------------------
    // Messages
    // -------------------------------------------------------------------------

    fn on_message(&mut self, from: ConnectionId, message: Message) {
        let Some(origin) = self.connections.get(&from).map(Outbox::kind) else {
            debug!(
                "Dropping {} from unregistered connection {}",
                message.address, from
            );
            return;
        };

        let result = match message.address.as_str() {
            SUBSCRIBE_ADDRESS => self.on_subscribe(&from, &message.args),
            RESEND_ADDRESS => self.on_resend(&from, &message.args),
            FROM_BLOB_ADDRESS => self.on_blob_from(&from, message.args),
            SEND_BLOB_ADDRESS | GIMME_BLOB_ADDRESS => self.on_blob_fetch(&from, &message.args),
            _ => self.on_send(&from, origin, message),
        };

        if let Err(e) = result {
            warn!("Message from {} rejected: {}", from, e);
            self.report(&from, e.to_string());
        }
    }

    fn on_subscribe(&mut self, from: &str, args: &[Arg]) -> Result<()> {
        let raw = string_arg(args, 0, "address")?;
        let address = Address::parse(raw)?;
        if self.tree.subscribe(&address, from) {
            debug!("{} subscribed to {}", from, raw);
        }
        self.send_to(from, SUBSCRIBED_ADDRESS, vec![Arg::String(raw.to_string())]);
        Ok(())
    }

    fn on_resend(&mut self, from: &str, args: &[Arg]) -> Result<()> {
        let raw = string_arg(args, 0, "address")?;
        let address = Address::parse(raw)?;
        let retained = self.tree.retained(&address);
        self.send_to(from, raw, retained);
        Ok(())
    }

    fn on_send(&mut self, from: &str, origin: ConnectionKind, message: Message) -> Result<()> {
        let address = validate_for_send(&message.address)?;

        if origin.uses_blob_files() && address.last() == Some(BLOB_SEGMENT) {
            if let Some(path) = message.args.first().and_then(Arg::as_str) {
                self.spawn_blob_read(from, address, path)?;
                return Ok(());
            }
        }

        self.publish(&address, message.args);
        Ok(())
    }

    /// Retain, then queue for every subscriber on the path
    fn publish(&mut self, address: &Address, args: Vec<Arg>) {
        self.tree.retain(address, args.clone());
        for id in self.tree.delivery_set(address) {
            self.send_to(&id, address.as_str(), args.clone());
        }
    }

    fn publish_blob(&mut self, address: &Address, blob: Bytes) {
        self.tree.retain(address, vec![Arg::Blob(blob.clone())]);
        for id in self.tree.delivery_set(address) {
            if let Some(outbox) = self.connections.get(&id) {
                outbox.send_blob(address.as_str(), blob.clone());
            }
        }
    }

    fn report(&self, to: &str, error: String) {
        self.send_to(to, ERROR_ADDRESS, vec![Arg::String(error)]);
    }

    fn send_to(&self, id: &str, address: &str, args: Vec<Arg>) {
        if let Some(outbox) = self.connections.get(id) {
            outbox.send(address, args);
        }
    }

    // -------------------------------------------------------------------------
    // Blob relay
    // -------------------------------------------------------------------------

    /// `(address, blob, flag...)`: store the blob, forward its path instead
    fn on_blob_from(&mut self, from: &str, args: Vec<Arg>) -> Result<()> {
        let address = validate_for_send(string_arg(&args, 0, "address")?)?;
        let blob = args
            .get(1)
            .and_then(Arg::as_blob)
            .cloned()
            .ok_or_else(|| RouterError::InvalidMessage("expected a blob as argument 1".into()))?;
        let rest: Vec<Arg> = args.into_iter().skip(2).collect();

        let blobs = Arc::clone(&self.blobs);
        let commands = self.commands.clone();
        let from = from.to_string();

        tokio::spawn(async move {
            let command = match blobs.write(&blob).await {
                Ok(path) => {
                    let mut args = Vec::with_capacity(rest.len() + 1);
                    args.push(Arg::String(path.to_string_lossy().into_owned()));
                    args.extend(rest);
                    Command::Publish { address, args }
                }
                Err(e) => {
                    error!("Blob write for {} failed: {}", address, e);
                    Command::Report {
                        to: from,
                        error: e.to_string(),
                    }
                }
            };
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command);
            }
        });

        Ok(())
    }

    /// `(address, path)`: read the stored blob and push it to `address`
    fn on_blob_fetch(&mut self, from: &str, args: &[Arg]) -> Result<()> {
        let address = validate_for_send(string_arg(args, 0, "address")?)?;
        let path = string_arg(args, 1, "path")?;
        self.spawn_blob_read(from, address, path)
    }

    fn spawn_blob_read(&mut self, from: &str, address: Address, path: &str) -> Result<()> {
        // Lexical check up front so obvious escapes never reach a task
        self.blobs.resolve(path)?;

        let blobs = Arc::clone(&self.blobs);
        let commands = self.commands.clone();
        let from = from.to_string();
        let path = path.to_string();

        tokio::spawn(async move {
            let command = match blobs.read(&path).await {
                Ok(blob) => Command::PublishBlob { address, blob },
                Err(e) => {
                    warn!("Blob read of {} for {} failed: {}", path, address, e);
                    Command::Report {
                        to: from,
                        error: e.to_string(),
                    }
                }
            };
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command);
            }
        });

        Ok(())
    }
}

fn string_arg<'a>(args: &'a [Arg], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(Arg::String(s)) => Ok(s),
        Some(other) => Err(RouterError::InvalidMessage(format!(
            "expected {} as argument {}, got {}",
            what,
            index,
            other.type_name()
        ))),
        None => Err(RouterError::InvalidMessage(format!(
            "expected {} as argument {}",
            what, index
        ))),
    }
}
