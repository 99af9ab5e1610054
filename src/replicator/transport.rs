//! The socket factory the replicator is built against (spec.md §6
//! "WebSocket transport (consumed)"), abstracted as a small trait with one
//! `tokio-tungstenite` implementation and one in-memory loopback pair for
//! tests — the same split the original's `c4WebSocket.cc`/
//! `TCPSocketFactory.hh` make between the real socket and
//! `LoopbackProvider.hh`'s paired test transport.

use crate::error::{LiteCoreError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// One binary frame exchanged over the wire. The replicator's `message`
/// layer encodes/decodes [`crate::replicator::message::Message`] values
/// into these.
#[derive(Debug, Clone)]
pub struct Frame(pub Vec<u8>);

/// Why the peer (or the local side) closed the connection.
#[derive(Debug, Clone)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// Callback-style events a transport delivers to its owner (spec.md §6):
/// open, incoming frame, peer close request, close completion, write
/// completion, receive-quota acknowledgment.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Frame(Frame),
    PeerRequestedClose(CloseInfo),
    Closed(CloseInfo),
    Writeable,
}

/// A bidirectional, frame-oriented transport. Implementations deliver
/// [`TransportEvent`]s through the channel returned by `connect`/`accept`
/// and accept outbound frames via `send`.
#[async_trait]
pub trait WebSocketTransport: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Client-masked WebSocket transport over `tokio-tungstenite`.
pub struct TungsteniteTransport {
    sink: SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, WsMessage>,
}

impl TungsteniteTransport {
    /// Connects to `url`, returning the transport plus a receiver of
    /// [`TransportEvent`]s driven by a background task reading the socket.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (ws, _response) =
            tokio_tungstenite::connect_async(url).await.map_err(|e| LiteCoreError::InvalidUrl(e.to_string()))?;
        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::channel(64);
        tx.send(TransportEvent::Connected).await.ok();
        tokio::spawn(pump_incoming(stream, tx));
        Ok((Self { sink }, rx))
    }
}

async fn pump_incoming(
    mut stream: SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>,
    tx: mpsc::Sender<TransportEvent>,
) {
    while let Some(msg) = stream.next().await {
        let event = match msg {
            Ok(WsMessage::Binary(bytes)) => TransportEvent::Frame(Frame(bytes)),
            Ok(WsMessage::Close(frame)) => TransportEvent::PeerRequestedClose(CloseInfo {
                code: frame.as_ref().map(|f| f.code.into()).unwrap_or(1000),
                reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
            }),
            Ok(_) => continue,
            Err(_) => break,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    let _ = tx.send(TransportEvent::Closed(CloseInfo { code: 1000, reason: String::new() })).await;
}

#[async_trait]
impl WebSocketTransport for TungsteniteTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.sink
            .send(WsMessage::Binary(frame.0))
            .await
            .map_err(|e| LiteCoreError::WebSocketStatus { code: 1006, message: e.to_string() })
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: code.into(),
            reason: reason.to_string().into(),
        };
        self.sink
            .send(WsMessage::Close(Some(frame)))
            .await
            .map_err(|e| LiteCoreError::WebSocketStatus { code: 1006, message: e.to_string() })
    }
}

/// An in-memory paired transport for tests, grounded in
/// `Networking/BLIP/LoopbackProvider.hh`'s description of a pair of
/// transports wired directly to each other without a real socket.
pub struct LoopbackTransport {
    outbound: mpsc::Sender<TransportEvent>,
}

impl LoopbackTransport {
    /// Builds a connected pair: frames sent on one side arrive as
    /// `TransportEvent::Frame` events on the other.
    pub fn pair() -> ((Self, mpsc::Receiver<TransportEvent>), (Self, mpsc::Receiver<TransportEvent>)) {
        let (tx_a, rx_a) = mpsc::channel(64);
        let (tx_b, rx_b) = mpsc::channel(64);
        ((Self { outbound: tx_b }, rx_a), (Self { outbound: tx_a }, rx_b))
    }
}

#[async_trait]
impl WebSocketTransport for LoopbackTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.outbound
            .send(TransportEvent::Frame(frame))
            .await
            .map_err(|_| LiteCoreError::WebSocketStatus { code: 1006, message: "peer gone".into() })
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let _ = self
            .outbound
            .send(TransportEvent::Closed(CloseInfo { code, reason: reason.to_string() }))
            .await;
        Ok(())
    }
}
