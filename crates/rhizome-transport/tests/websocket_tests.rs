//! WebSocket transport tests

use bytes::Bytes;
use rhizome_transport::{
    Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
    WebSocketServer, WebSocketTransport,
};
use std::time::Duration;
use tokio::time::timeout;

/// Wait for the next Data/Text event, skipping Connected
async fn next_payload(receiver: &mut impl TransportReceiver) -> Option<TransportEvent> {
    loop {
        match timeout(Duration::from_secs(2), receiver.recv()).await.ok()?? {
            TransportEvent::Connected => continue,
            other => return Some(other),
        }
    }
}

#[tokio::test]
async fn test_websocket_query_and_frames() {
    let mut server = WebSocketServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();

    let accept = tokio::spawn(async move { server.accept().await });

    let url = format!("ws://{}/?queueIfFull=false&id=abc", addr);
    let (client_tx, mut client_rx) = WebSocketTransport::connect(&url).await.unwrap();

    let (server_tx, mut server_rx, info) = accept.await.unwrap().unwrap();
    assert_eq!(info.param("queueIfFull"), Some("false"));
    assert_eq!(info.param("id"), Some("abc"));
    assert_eq!(info.param("missing"), None);

    // binary client -> server
    client_tx.send(Bytes::from_static(b"osc")).await.unwrap();
    match next_payload(&mut server_rx).await {
        Some(TransportEvent::Data(data)) => assert_eq!(data.as_ref(), b"osc"),
        other => panic!("expected data, got {:?}", other),
    }

    // text server -> client
    server_tx.send_text("{\"command\":\"blob\"}".to_string()).await.unwrap();
    match next_payload(&mut client_rx).await {
        Some(TransportEvent::Text(text)) => assert!(text.contains("blob")),
        other => panic!("expected text, got {:?}", other),
    }

    // server closes -> client sees disconnect
    server_tx.close().await.unwrap();
    match next_payload(&mut client_rx).await {
        Some(TransportEvent::Disconnected { .. }) => {}
        other => panic!("expected disconnect, got {:?}", other),
    }
    assert!(!server_tx.is_connected());
}

#[tokio::test]
async fn test_websocket_connect_refused() {
    // Nothing listens on this port once the listener is dropped
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("ws://127.0.0.1:{}/", port);
    assert!(WebSocketTransport::connect(&url).await.is_err());
}

#[tokio::test]
async fn test_websocket_invalid_url() {
    assert!(WebSocketTransport::connect("not a url").await.is_err());
}
