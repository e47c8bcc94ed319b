//! WebSocket transport implementation

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        handshake::server::{Request as HsRequest, Response as HsResponse},
        protocol::Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{
    ConnectInfo, Transport, TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

/// WebSocket transport (client side)
#[derive(Debug, Default)]
pub struct WebSocketTransport;

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.push(WsMessage::Binary(data.to_vec())).await
    }

    async fn send_text(&self, text: String) -> Result<()> {
        self.push(WsMessage::Text(text)).await
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.tx.send(WsMessage::Close(None)).await;
        *self.connected.lock() = false;
        Ok(())
    }
}

impl WebSocketSender {
    async fn push(&self, msg: WsMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Split a WebSocket stream into a writer task and a reader task, bridged
/// through channels.
fn spawn_stream<S>(ws_stream: WebSocketStream<S>) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(100);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(100);

    let connected = Arc::new(Mutex::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        *connected_write.lock() = false;
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        let mut reason = None;
        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Binary(data)) => {
                    let _ = event_tx.send(TransportEvent::Data(Bytes::from(data))).await;
                }
                Ok(WsMessage::Text(text)) => {
                    let _ = event_tx.send(TransportEvent::Text(text)).await;
                }
                Ok(WsMessage::Close(frame)) => {
                    reason = frame.map(|f| f.reason.to_string());
                    debug!("WebSocket closed: {:?}", reason);
                    break;
                }
                Ok(_) => {
                    // Ping/pong are answered by tungstenite
                }
                Err(e) => {
                    warn!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    reason = Some(e.to_string());
                    break;
                }
            }
        }

        *connected_read.lock() = false;
        let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
    });

    (
        WebSocketSender {
            tx: send_tx,
            connected,
        },
        WebSocketReceiver { rx: event_rx },
    )
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn connect(url: &str) -> Result<(Self::Sender, Self::Receiver)> {
        info!("Connecting to WebSocket: {}", url);

        url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        Ok(spawn_stream(ws_stream))
    }
}

/// WebSocket server
pub struct WebSocketServer {
    listener: tokio::net::TcpListener,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("WebSocket server listening on {}", addr);

        Ok(Self { listener })
    }
}

/// Parse the query string of a connect request into key/value pairs
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TransportServer for WebSocketServer {
    type Sender = WebSocketSender;
    type Receiver = WebSocketReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, ConnectInfo)> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("Accepted TCP connection from {}", addr);

        // The query string carries the client's identity and queue policy
        let mut query = None;
        let ws_stream =
            tokio_tungstenite::accept_hdr_async(stream, |req: &HsRequest, response: HsResponse| {
                query = req.uri().query().map(|q| q.to_string());
                Ok(response)
            })
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("WebSocket client connected from {}", addr);

        let (sender, receiver) = spawn_stream(ws_stream);
        let info = ConnectInfo {
            addr,
            query: parse_query(query.as_deref()),
        };

        Ok((sender, receiver, info))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query = parse_query(Some("queueIfFull=true&id=abc%20def"));
        assert_eq!(query.get("queueIfFull").map(|s| s.as_str()), Some("true"));
        assert_eq!(query.get("id").map(|s| s.as_str()), Some("abc def"));
        assert!(parse_query(None).is_empty());
    }
}
