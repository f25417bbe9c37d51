//! WebSocket transport implementation
//!
//! ## 責務
//!
//! - Run the handshake and the socket on a spawned task
//! - Encode outgoing text as `{"message": ...}` frames
//! - Report open, inbound text, errors and close to the owner
//!
//! ## 設計ノート
//!
//! The connection object held by the session only owns an outbound queue
//! and the link's open flag. The socket itself lives in the driver task,
//! so dropping or closing a connection never blocks the caller.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::{
    domain::HandleId,
    infrastructure::dto::websocket::OutboundFrame,
};

use super::{Connection, EventSink, OpenRequest, Transport, TransportEventKind};

/// Commands from the connection handle to its driver task
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

/// Transport that talks to the chat backend over WebSocket
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, request: OpenRequest) -> Box<dyn Connection> {
        let handle = request.events.handle();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tracing::debug!("Opening WebSocket connection {}", handle);
        tokio::spawn(drive(request.url, request.events, outbound_rx, open.clone()));

        Box::new(WebSocketConnection {
            handle,
            outbound_tx,
            open,
            closed: false,
        })
    }
}

/// Handle to one WebSocket connection
pub struct WebSocketConnection {
    handle: HandleId,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
    closed: bool,
}

impl Connection for WebSocketConnection {
    fn handle(&self) -> HandleId {
        self.handle
    }

    fn send(&self, text: &str) {
        if self.closed || !self.open.load(Ordering::SeqCst) {
            tracing::debug!("Connection {} is not open, dropping outbound message", self.handle);
            return;
        }

        let json = match serde_json::to_string(&OutboundFrame::from(text)) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return;
            }
        };

        if self.outbound_tx.send(Outbound::Text(json)).is_err() {
            tracing::debug!("Connection {} driver has stopped, dropping message", self.handle);
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open.store(false, Ordering::SeqCst);
        // The driver may already be gone; nothing left to close then
        let _ = self.outbound_tx.send(Outbound::Close);
        tracing::debug!("Close requested for connection {}", self.handle);
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Wait until the handle asks for shutdown (or is dropped)
async fn close_requested(outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>) {
    loop {
        match outbound_rx.recv().await {
            Some(Outbound::Close) | None => return,
            // sends are gated on the open flag, so nothing should be queued yet
            Some(Outbound::Text(_)) => continue,
        }
    }
}

async fn drive(
    url: String,
    events: EventSink,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    open: Arc<AtomicBool>,
) {
    let handle = events.handle();

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = close_requested(&mut outbound_rx) => {
            tracing::debug!("Connection {} closed during handshake", handle);
            events.emit(TransportEventKind::Close(None));
            return;
        }
    };

    let ws_stream = match connected {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            tracing::warn!("WebSocket handshake failed for {}: {}", handle, e);
            events.emit(TransportEventKind::Error(e.to_string()));
            events.emit(TransportEventKind::Close(None));
            return;
        }
    };

    open.store(true, Ordering::SeqCst);
    tracing::info!("Connection {} established", handle);
    if !events.emit(TransportEventKind::Open) {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Text(json)) => {
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        tracing::warn!("Failed to send message on {}: {}", handle, e);
                        events.emit(TransportEventKind::Error(e.to_string()));
                        events.emit(TransportEventKind::Close(None));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = write.close().await {
                        tracing::debug!("Close handshake on {} failed: {}", handle, e);
                    }
                    events.emit(TransportEventKind::Close(Some(1000)));
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("Received text on {}: {}", handle, text);
                    events.emit(TransportEventKind::Message(text.to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!("Ignoring {} bytes of binary data on {}", data.len(), handle);
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    tracing::info!("Server closed connection {} (code {:?})", handle, code);
                    events.emit(TransportEventKind::Close(code));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket read error on {}: {}", handle, e);
                    events.emit(TransportEventKind::Error(e.to_string()));
                    events.emit(TransportEventKind::Close(None));
                    break;
                }
                None => {
                    events.emit(TransportEventKind::Close(None));
                    break;
                }
            },
        }
    }

    open.store(false, Ordering::SeqCst);
}
