//! Client state machine tests (rhizome-client)
//!
//! The router side is played by hand through a scripted connector, so
//! every handshake outcome and connection loss can be driven exactly.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rhizome_client::{
    Client, ClientBuilder, ClientError, ClientEvent, ClientStatus, Connector, IdentityStore,
    MemoryStore,
};
use rhizome_core::sys::{CONNECTION_STATUS_ADDRESS, SUBSCRIBE_ADDRESS};
use rhizome_core::{codec, Arg, BlobEnvelope, ConnectionStatus, Message};
use rhizome_transport::{TransportError, TransportEvent, TransportReceiver, TransportSender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Scripted transport
// ============================================================================

struct FakeSender {
    connected: AtomicBool,
    sent: Mutex<Vec<Bytes>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl TransportSender for FakeSender {
    async fn send(&self, data: Bytes) -> rhizome_transport::Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(data);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> rhizome_transport::Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected { reason: None });
        }
        Ok(())
    }
}

struct FakeReceiver {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for FakeReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// The router's end of one scripted connection
struct RouterSide {
    url: String,
    sender: Arc<FakeSender>,
}

impl RouterSide {
    fn push(&self, address: &str, args: Vec<Arg>) {
        let data = codec::encode(address, &args).unwrap();
        let _ = self.sender.events.send(TransportEvent::Data(data));
    }

    fn status(&self, status: ConnectionStatus, payload: &str) {
        self.push(CONNECTION_STATUS_ADDRESS, status.to_args(payload));
    }

    fn push_text(&self, text: String) {
        let _ = self.sender.events.send(TransportEvent::Text(text));
    }

    /// Simulate the network going away
    fn drop_connection(&self) {
        self.sender.connected.store(false, Ordering::SeqCst);
        let _ = self.sender.events.send(TransportEvent::Disconnected {
            reason: Some("reset".to_string()),
        });
    }

    fn sent(&self) -> Vec<Message> {
        self.sender
            .sent
            .lock()
            .iter()
            .map(|data| codec::decode(data).unwrap())
            .collect()
    }
}

struct ScriptedConnector {
    supported: bool,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<RouterSide>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn connect(
        &self,
        url: &str,
    ) -> rhizome_client::Result<(Arc<dyn TransportSender>, Box<dyn TransportReceiver>)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed("connection refused".into()).into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Arc::new(FakeSender {
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            events: tx,
        });
        let _ = self.accepted.send(RouterSide {
            url: url.to_string(),
            sender: Arc::clone(&sender),
        });
        Ok((sender, Box::new(FakeReceiver { events: rx })))
    }
}

fn scripted(supported: bool) -> (Arc<ScriptedConnector>, mpsc::UnboundedReceiver<RouterSide>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = Arc::new(ScriptedConnector {
        supported,
        refuse: AtomicBool::new(false),
        attempts: AtomicUsize::new(0),
        accepted: tx,
    });
    (connector, rx)
}

fn builder(connector: &Arc<ScriptedConnector>) -> ClientBuilder {
    Client::builder("127.0.0.1", 8000)
        .reconnect_ms(0)
        .connector(connector.clone())
}

async fn next_side(accepted: &mut mpsc::UnboundedReceiver<RouterSide>) -> RouterSide {
    timeout(WAIT, accepted.recv())
        .await
        .expect("no connection attempt")
        .expect("connector dropped")
}

async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("no event")
        .expect("event channel closed")
}

/// Start `client` and admit it as `id`
async fn started(
    client: &Client,
    accepted: &mut mpsc::UnboundedReceiver<RouterSide>,
    id: &str,
) -> RouterSide {
    let starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };
    let side = next_side(accepted).await;
    side.status(ConnectionStatus::Success, id);
    assert_eq!(starting.await.unwrap().unwrap(), id);
    side
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_start_resolves_with_assigned_identity() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();
    let mut events = client.events();

    let side = started(&client, &mut accepted, "abc").await;

    assert_eq!(client.status(), ClientStatus::Started);
    assert_eq!(client.id().as_deref(), Some("abc"));
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected("abc".into()));
    assert!(side.url.contains("queueIfFull=true"));
    // Nothing is sent during the handshake
    assert!(side.sent().is_empty());
}

#[tokio::test]
async fn test_queued_until_admitted() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).queue_if_full(true).build().unwrap();
    let mut events = client.events();

    let starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };
    let side = next_side(&mut accepted).await;

    side.status(ConnectionStatus::Refused, "the server is full");
    assert_eq!(next_event(&mut events).await, ClientEvent::Queued);
    assert_eq!(client.status(), ClientStatus::Queued);
    assert!(!starting.is_finished());

    side.status(ConnectionStatus::Success, "abc");
    assert_eq!(starting.await.unwrap().unwrap(), "abc");
    assert_eq!(client.status(), ClientStatus::Started);
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected("abc".into()));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refused_without_queue() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).queue_if_full(false).build().unwrap();

    let starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };
    let side = next_side(&mut accepted).await;
    assert!(side.url.contains("queueIfFull=false"));

    side.status(ConnectionStatus::Refused, "the server is full");
    let result = starting.await.unwrap();

    match result {
        Err(ClientError::AdmissionRefused(reason)) => assert_eq!(reason, "the server is full"),
        other => panic!("expected refusal, got {:?}", other),
    }
    assert_eq!(client.status(), ClientStatus::Stopped);
    assert!(!side.sender.is_connected());
}

#[tokio::test]
async fn test_malformed_status_closes_transport() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();

    let starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };
    let side = next_side(&mut accepted).await;

    side.push(CONNECTION_STATUS_ADDRESS, vec![Arg::String("x".into())]);
    let result = starting.await.unwrap();

    assert!(matches!(result, Err(ClientError::Protocol(_))));
    assert_eq!(client.status(), ClientStatus::Stopped);
    assert!(!side.sender.is_connected());
}

#[tokio::test]
async fn test_unsupported_environment() {
    let (connector, _accepted) = scripted(false);
    let client = builder(&connector).build().unwrap();

    let result = client.start().await;

    assert!(matches!(result, Err(ClientError::Unsupported(_))));
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(client.status(), ClientStatus::Stopped);
}

#[tokio::test]
async fn test_connection_failure() {
    let (connector, _accepted) = scripted(true);
    connector.refuse.store(true, Ordering::SeqCst);
    let client = builder(&connector).build().unwrap();

    let result = client.start().await;

    assert!(matches!(result, Err(ClientError::ConnectionFailed(_))));
    assert_eq!(client.status(), ClientStatus::Stopped);
}

#[tokio::test]
async fn test_closed_during_handshake() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();

    let starting = {
        let client = client.clone();
        tokio::spawn(async move { client.start().await })
    };
    next_side(&mut accepted).await.drop_connection();

    assert!(matches!(
        starting.await.unwrap(),
        Err(ClientError::ConnectionFailed(_))
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let result = Client::builder("", 8000).build();
    assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnects_once_after_loss() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).reconnect_ms(50).build().unwrap();
    let mut events = client.events();

    let first = started(&client, &mut accepted, "abc").await;
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected("abc".into()));

    first.drop_connection();
    assert_eq!(next_event(&mut events).await, ClientEvent::ConnectionLost);

    let second = next_side(&mut accepted).await;
    assert!(second.url.contains("id=abc"));
    second.status(ConnectionStatus::Success, "abc");

    assert_eq!(next_event(&mut events).await, ClientEvent::Connected("abc".into()));
    assert_eq!(client.status(), ClientStatus::Started);

    // No further attempt while the new connection is up
    assert!(timeout(Duration::from_millis(200), accepted.recv())
        .await
        .is_err());
    assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reconnect_retries_until_router_is_back() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).reconnect_ms(20).build().unwrap();

    let first = started(&client, &mut accepted, "abc").await;
    connector.refuse.store(true, Ordering::SeqCst);
    first.drop_connection();

    let attempts = &connector.attempts;
    let retried = rhizome_test_utils::wait_for(
        || async move { attempts.load(Ordering::SeqCst) >= 3 },
        Duration::from_millis(10),
        WAIT,
    )
    .await;
    assert!(retried);

    connector.refuse.store(false, Ordering::SeqCst);
    let side = next_side(&mut accepted).await;
    side.status(ConnectionStatus::Success, "abc");

    let client_ref = &client;
    let back = rhizome_test_utils::wait_for(
        || async move { client_ref.status() == ClientStatus::Started },
        Duration::from_millis(10),
        WAIT,
    )
    .await;
    assert!(back);
}

#[tokio::test]
async fn test_no_reconnect_when_disabled() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).reconnect_ms(0).build().unwrap();
    let mut events = client.events();

    let side = started(&client, &mut accepted, "abc").await;
    next_event(&mut events).await;
    side.drop_connection();

    assert_eq!(next_event(&mut events).await, ClientEvent::ConnectionLost);
    assert_eq!(client.status(), ClientStatus::Stopped);
    assert!(timeout(Duration::from_millis(200), accepted.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_stop_never_reconnects() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).reconnect_ms(20).build().unwrap();
    let mut events = client.events();

    let side = started(&client, &mut accepted, "abc").await;
    next_event(&mut events).await;

    client.stop().await.unwrap();

    assert_eq!(client.status(), ClientStatus::Stopped);
    assert_eq!(client.id(), None);
    assert!(!side.sender.is_connected());
    assert!(timeout(Duration::from_millis(200), accepted.recv())
        .await
        .is_err());
    assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
}

#[tokio::test]
async fn test_restart_replaces_connection() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).reconnect_ms(20).build().unwrap();

    let first = started(&client, &mut accepted, "abc").await;
    let second = started(&client, &mut accepted, "abc").await;

    assert!(!first.sender.is_connected());
    assert!(second.sender.is_connected());
    // The old connection closing must not count as a loss
    assert!(timeout(Duration::from_millis(200), accepted.recv())
        .await
        .is_err());
}

// ============================================================================
// Identity persistence
// ============================================================================

#[tokio::test]
async fn test_identity_persisted_and_requested() {
    let (connector, mut accepted) = scripted(true);
    let store = Arc::new(MemoryStore::new());

    let client = builder(&connector)
        .identity_store(store.clone())
        .identity_key("desk")
        .build()
        .unwrap();
    let side = started(&client, &mut accepted, "abc").await;
    assert!(!side.url.contains("id="));
    assert_eq!(store.get("desk").as_deref(), Some("abc"));

    let again = builder(&connector)
        .identity_store(store.clone())
        .identity_key("desk")
        .build()
        .unwrap();
    let side = started(&again, &mut accepted, "abc").await;
    assert!(side.url.contains("id=abc"));
}

#[tokio::test]
async fn test_identity_not_persisted_when_disabled() {
    let (connector, mut accepted) = scripted(true);
    let store = Arc::new(MemoryStore::new());
    store.set("rhizome", "old");

    let client = builder(&connector)
        .identity_store(store.clone())
        .persist_identity(false)
        .build()
        .unwrap();
    let side = started(&client, &mut accepted, "new").await;

    assert!(!side.url.contains("id="));
    assert_eq!(store.get("rhizome").as_deref(), Some("old"));
}

// ============================================================================
// Messaging
// ============================================================================

#[tokio::test]
async fn test_send_before_start() {
    let (connector, _accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();

    let result = client.send("/bla", vec![1.into()]).await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_outgoing_messages() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();
    let side = started(&client, &mut accepted, "abc").await;

    client.subscribe("/bla").await.unwrap();
    client
        .send("/bla/bli", vec![1.into(), "toitoi".into()])
        .await
        .unwrap();

    assert!(matches!(
        client.send("/sys/subscribe", vec![]).await,
        Err(ClientError::Protocol(_))
    ));
    assert!(matches!(
        client.send("/bla/*", vec![]).await,
        Err(ClientError::Protocol(_))
    ));

    assert_eq!(
        side.sent(),
        vec![
            Message::new(SUBSCRIBE_ADDRESS, vec!["/bla".into()]),
            Message::new("/bla/bli", vec![Arg::Int(1), Arg::String("toitoi".into())]),
        ]
    );
}

#[tokio::test]
async fn test_incoming_messages_become_events() {
    let (connector, mut accepted) = scripted(true);
    let client = builder(&connector).build().unwrap();
    let mut events = client.events();
    let side = started(&client, &mut accepted, "abc").await;
    next_event(&mut events).await;

    side.push("/bla/bli", vec![Arg::Int(1)]);
    side.push_text(BlobEnvelope::new("/bla/blob", b"blobbyA".to_vec()).to_json().unwrap());

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Message(Message::new("/bla/bli", vec![Arg::Int(1)]))
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Message(Message::new(
            "/bla/blob",
            vec![Arg::Blob(Bytes::from_static(b"blobbyA"))]
        ))
    );
}
