//! Connections registered with the router
//!
//! A connection is anything the router can push messages to. WebSocket
//! connections go through the handshake and count against the capacity
//! limit; OSC peers do not, and receive blobs as files in the blob
//! directory.

use async_trait::async_trait;
use bytes::Bytes;
use rhizome_core::{codec, Arg, BlobEnvelope};
use rhizome_transport::TransportSender;
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::error::Result;

/// Connection identifier, unique among registered connections
pub type ConnectionId = String;

/// Prefix of the ids of OSC peers, followed by their UDP endpoint
pub const OSC_ID_PREFIX: &str = "osc:";

/// Kind of a connection, decides how the router treats it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    WebSocket,
    Osc,
}

impl ConnectionKind {
    /// Whether the connection goes through the handshake and admission
    pub fn requires_handshake(self) -> bool {
        matches!(self, ConnectionKind::WebSocket)
    }

    /// Whether the connection exchanges blobs as files in the blob directory
    pub fn uses_blob_files(self) -> bool {
        matches!(self, ConnectionKind::Osc)
    }
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionKind::WebSocket => write!(f, "websocket"),
            ConnectionKind::Osc => write!(f, "osc"),
        }
    }
}

/// Outbound side of a connection
#[async_trait]
pub trait Connection: Send + Sync {
    fn kind(&self) -> ConnectionKind;

    /// Send an ordinary message
    async fn send(&self, address: &str, args: &[Arg]) -> Result<()>;

    /// Push a blob, the way this kind of peer expects it
    async fn send_blob(&self, address: &str, blob: Bytes) -> Result<()> {
        self.send(address, &[Arg::Blob(blob)]).await
    }

    /// Close the underlying transport
    async fn close(&self) -> Result<()>;
}

/// WebSocket peer: OSC packets in binary frames, blobs as JSON text frames
pub struct WebSocketConnection {
    sender: Arc<dyn TransportSender>,
}

impl WebSocketConnection {
    pub fn new(sender: Arc<dyn TransportSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::WebSocket
    }

    async fn send(&self, address: &str, args: &[Arg]) -> Result<()> {
        let data = codec::encode(address, args)?;
        self.sender.send(data).await?;
        Ok(())
    }

    async fn send_blob(&self, address: &str, blob: Bytes) -> Result<()> {
        let json = BlobEnvelope::new(address, blob.to_vec()).to_json()?;
        self.sender.send_text(json).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sender.close().await?;
        Ok(())
    }
}

/// OSC peer reached over UDP. Blobs never travel inline: they are written
/// to the blob directory and the peer gets the file path.
pub struct OscConnection {
    sender: Arc<dyn TransportSender>,
    blobs: Arc<BlobStore>,
}

impl OscConnection {
    pub fn new(sender: Arc<dyn TransportSender>, blobs: Arc<BlobStore>) -> Self {
        Self { sender, blobs }
    }

    async fn store(&self, blob: &[u8]) -> Result<Arg> {
        let path = self.blobs.write(blob).await?;
        Ok(Arg::String(path.to_string_lossy().into_owned()))
    }
}

#[async_trait]
impl Connection for OscConnection {
    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Osc
    }

    async fn send(&self, address: &str, args: &[Arg]) -> Result<()> {
        let data = if args.iter().any(Arg::is_blob) {
            let mut stored = Vec::with_capacity(args.len());
            for arg in args {
                stored.push(match arg.as_blob() {
                    Some(blob) => self.store(blob).await?,
                    None => arg.clone(),
                });
            }
            codec::encode(address, &stored)?
        } else {
            codec::encode(address, args)?
        };
        self.sender.send(data).await?;
        Ok(())
    }

    async fn send_blob(&self, address: &str, blob: Bytes) -> Result<()> {
        let path = self.store(&blob).await?;
        let data = codec::encode(address, &[path])?;
        self.sender.send(data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.sender.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps every datagram
    #[derive(Default)]
    struct Captured {
        sent: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl TransportSender for Captured {
        async fn send(&self, data: Bytes) -> rhizome_transport::Result<()> {
            self.sent.lock().push(data);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn close(&self) -> rhizome_transport::Result<()> {
            Ok(())
        }
    }

    fn osc() -> (OscConnection, Arc<Captured>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let captured = Arc::new(Captured::default());
        let blobs = Arc::new(BlobStore::open(dir.path()).unwrap());
        (OscConnection::new(captured.clone(), blobs), captured, dir)
    }

    fn stored_path(captured: &Captured, index: usize) -> String {
        let data = captured.sent.lock()[0].clone();
        let messages = codec::decode_packet(&data).unwrap();
        messages[0].args[index].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_osc_blob_sent_as_file_path() {
        let (conn, captured, dir) = osc();
        // Far more than one datagram can carry
        let big = vec![7u8; 200_000];

        conn.send_blob("/bla/blob", Bytes::from(big.clone())).await.unwrap();

        let path = stored_path(&captured, 0);
        assert!(std::path::Path::new(&path).starts_with(dir.path().canonicalize().unwrap()));
        assert_eq!(std::fs::read(path).unwrap(), big);
    }

    #[tokio::test]
    async fn test_osc_blob_args_rewritten() {
        let (conn, captured, _dir) = osc();

        conn.send("/bla/blob", &[Arg::Blob(Bytes::from_static(b"blobbyA")), Arg::Int(1)])
            .await
            .unwrap();

        assert_eq!(std::fs::read(stored_path(&captured, 0)).unwrap(), b"blobbyA");
        let data = captured.sent.lock()[0].clone();
        assert_eq!(codec::decode_packet(&data).unwrap()[0].args[1], Arg::Int(1));
    }
}
