//! Transport bindings
//!
//! ## 概要
//!
//! A transport opens one bidirectional message stream per `open` call and
//! reports what happens on it as [`TransportEvent`]s sent to the owner's
//! channel. The owner never registers callbacks on the connection itself.
//!
//! ## 実装
//!
//! - `websocket`: tokio-tungstenite client
//! - `simulated`: in-process operator for demos and offline use

pub mod simulated;
pub mod websocket;

use tokio::sync::mpsc;

use crate::domain::HandleId;

pub use simulated::{SimulatedConfig, SimulatedTransport};
pub use websocket::WebSocketTransport;

/// What happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed, sends are now transmitted
    Open,
    /// Raw text payload as received
    Message(String),
    /// Handshake or transport failure
    Error(String),
    /// The stream ended, with the close code when one was received
    Close(Option<u16>),
}

/// Event tagged with the connection that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub handle: HandleId,
    pub kind: TransportEventKind,
}

/// Sending half handed to a connection for reporting its events
#[derive(Debug, Clone)]
pub struct EventSink {
    handle: HandleId,
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl EventSink {
    pub fn new(handle: HandleId, tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Report an event. Returns `false` once the owner has gone away.
    pub fn emit(&self, kind: TransportEventKind) -> bool {
        self.tx
            .send(TransportEvent {
                handle: self.handle,
                kind,
            })
            .is_ok()
    }
}

/// Everything a transport needs to open one connection
#[derive(Debug)]
pub struct OpenRequest {
    pub url: String,
    pub events: EventSink,
}

/// Factory for connections
///
/// `open` must return immediately; establishing the stream happens in the
/// background and its outcome is reported through `request.events`.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    fn open(&self, request: OpenRequest) -> Box<dyn Connection>;
}

/// One opened connection
#[cfg_attr(test, mockall::automock)]
pub trait Connection: Send {
    fn handle(&self) -> HandleId;

    /// Transmit `text` if the connection is open, otherwise drop it silently
    fn send(&self, text: &str);

    /// Request a graceful shutdown. Safe to call more than once.
    fn close(&mut self);
}
