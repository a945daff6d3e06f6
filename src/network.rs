//! Player socket listener
//!
//! Accepts WebSocket sessions and passes each one through the admission gate.
//! Outbound traffic is UTF-8 text frames; inbound frames are left to the
//! shards and only watched here to notice the peer going away.

use crate::gate::ConnectionGate;
use crate::shard::PlayerConnection;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsReceiver = SplitStream<WsStream>;

enum Outbound {
    Text(String),
    Close,
}

/// Upgraded player session. Writes go through a background task.
pub struct SocketConnection {
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
    closed: Option<oneshot::Receiver<()>>,
}

impl SocketConnection {
    /// Split the stream and start its writer and reader tasks
    pub fn spawn(stream: WsStream, peer: SocketAddr) -> Self {
        let (sink, receiver) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(write_frames(sink, rx, peer));
        tokio::spawn(watch_peer(receiver, closed_tx, peer));

        Self {
            peer,
            tx,
            closed: Some(closed_rx),
        }
    }
}

impl PlayerConnection for SocketConnection {
    fn send_utf8(&mut self, message: &str) {
        let _ = self.tx.send(Outbound::Text(message.to_string()));
    }

    fn close(self: Box<Self>) {
        let _ = self.tx.send(Outbound::Close);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn closed(&mut self) -> Option<oneshot::Receiver<()>> {
        self.closed.take()
    }
}

async fn write_frames(mut sink: WsSink, mut rx: mpsc::UnboundedReceiver<Outbound>, peer: SocketAddr) {
    while let Some(Outbound::Text(text)) = rx.recv().await {
        if let Err(e) = sink.send(Message::text(text)).await {
            debug!(%peer, error = %e, "Write failed");
            return;
        }
    }

    // Explicit close, or every handle to the session was dropped
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(%peer, error = %e, "Close failed");
    }
}

async fn watch_peer(mut receiver: WsReceiver, closed: oneshot::Sender<()>, peer: SocketAddr) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%peer, error = %e, "Read failed");
                break;
            }
        }
    }

    debug!(%peer, "Peer disconnected");
    let _ = closed.send(());
}

/// Accept player sessions forever
pub async fn serve_players(listener: TcpListener, gate: Arc<ConnectionGate>) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Accepting player connections");
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { admit_socket(stream, peer, &gate).await });
            }
            Err(e) => {
                error!(error = %e, "Accept failed");
            }
        }
    }
}

async fn admit_socket(stream: TcpStream, peer: SocketAddr, gate: &ConnectionGate) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let admission = gate.admit(Box::new(SocketConnection::spawn(ws, peer)));
    debug!(%peer, ?admission, "Connection handled");
}
