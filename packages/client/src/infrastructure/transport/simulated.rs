//! In-process stand-in for the chat backend.
//!
//! Behaves like an operator who greets the reporter and acknowledges every
//! message. Used by the `simulated` backend of the terminal client and by
//! tests that need a transport which always connects.

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use trustlink_shared::time::{Clock, SystemClock, timestamp_to_rfc3339};

use crate::{domain::HandleId, infrastructure::dto::websocket::InboundFrame};

use super::{Connection, EventSink, OpenRequest, Transport, TransportEventKind};

const OPERATOR_ID: i64 = 2;
const OPERATOR_NAME: &str = "Operator";
const GREETING: &str = "Hello! How can I help you?";

#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Delay between open and the operator greeting
    pub greeting_delay: Duration,
    /// Delay before each acknowledgement
    pub reply_delay: Duration,
    /// Incident id echoed in generated frames
    pub incident_id: Option<i64>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            greeting_delay: Duration::from_secs(1),
            reply_delay: Duration::from_millis(1500),
            incident_id: None,
        }
    }
}

pub struct SimulatedTransport {
    config: SimulatedConfig,
    clock: Arc<dyn Clock>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatedConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SimulatedConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }
}

impl Transport for SimulatedTransport {
    fn open(&self, request: OpenRequest) -> Box<dyn Connection> {
        let handle = request.events.handle();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::info!("Simulated connection {} to {}", handle, redact_token(&request.url));
        tokio::spawn(operator_loop(
            self.config.clone(),
            self.clock.clone(),
            request.events,
            outbound_rx,
        ));

        Box::new(SimulatedConnection {
            handle,
            outbound_tx: Some(outbound_tx),
        })
    }
}

struct SimulatedConnection {
    handle: HandleId,
    /// `None` once closed
    outbound_tx: Option<mpsc::UnboundedSender<String>>,
}

impl Connection for SimulatedConnection {
    fn handle(&self) -> HandleId {
        self.handle
    }

    fn send(&self, text: &str) {
        match &self.outbound_tx {
            Some(tx) => {
                tracing::debug!("Simulated send on {}: {}", self.handle, text);
                let _ = tx.send(text.to_string());
            }
            None => tracing::debug!("Connection {} is closed, dropping message", self.handle),
        }
    }

    fn close(&mut self) {
        if self.outbound_tx.take().is_some() {
            tracing::info!("Simulated connection {} closed", self.handle);
        }
    }
}

fn operator_frame(config: &SimulatedConfig, clock: &dyn Clock, content: String) -> String {
    let now = clock.now_millis();
    let frame = InboundFrame {
        id: Some(now),
        content,
        sender_id: OPERATOR_ID,
        created_at: timestamp_to_rfc3339(now),
        sender_name: Some(OPERATOR_NAME.to_string()),
        incident_id: config.incident_id,
    };
    // InboundFrame has only string and integer fields
    serde_json::to_string(&frame).unwrap_or_default()
}

async fn operator_loop(
    config: SimulatedConfig,
    clock: Arc<dyn Clock>,
    events: EventSink,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    if !events.emit(TransportEventKind::Open) {
        return;
    }

    // messages sent before the greeting are answered after it
    let mut early = Vec::new();
    let greeting = tokio::time::sleep(config.greeting_delay);
    tokio::pin!(greeting);

    loop {
        tokio::select! {
            _ = &mut greeting => {
                let frame = operator_frame(&config, clock.as_ref(), GREETING.to_string());
                if !events.emit(TransportEventKind::Message(frame)) {
                    return;
                }
                break;
            }
            text = outbound_rx.recv() => match text {
                Some(text) => early.push(text),
                None => {
                    events.emit(TransportEventKind::Close(Some(1000)));
                    return;
                }
            },
        }
    }

    for text in early {
        if !acknowledge(&config, clock.as_ref(), &events, &text).await {
            return;
        }
    }

    while let Some(text) = outbound_rx.recv().await {
        if !acknowledge(&config, clock.as_ref(), &events, &text).await {
            return;
        }
    }

    events.emit(TransportEventKind::Close(Some(1000)));
}

async fn acknowledge(
    config: &SimulatedConfig,
    clock: &dyn Clock,
    events: &EventSink,
    text: &str,
) -> bool {
    tokio::time::sleep(config.reply_delay).await;
    let reply = format!("Thanks for your message! We received: \"{}\"", text);
    events.emit(TransportEventKind::Message(operator_frame(config, clock, reply)))
}

fn redact_token(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::TransportEvent;
    use trustlink_shared::time::FixedClock;

    fn quick_transport() -> SimulatedTransport {
        SimulatedTransport::with_clock(
            SimulatedConfig {
                greeting_delay: Duration::from_millis(1),
                reply_delay: Duration::from_millis(1),
                incident_id: Some(42),
            },
            Arc::new(FixedClock::new(1735689600000)),
        )
    }

    fn decode(event: TransportEvent) -> InboundFrame {
        match event.kind {
            TransportEventKind::Message(raw) => serde_json::from_str(&raw).unwrap(),
            other => panic!("expected message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_simulated_operator_greets_and_replies() {
        // テスト項目: 接続後に挨拶が届き、送信したメッセージに返信が届く
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = quick_transport().open(OpenRequest {
            url: "sim://chat/42?token=t".to_string(),
            events: EventSink::new(HandleId::new(1), tx),
        });

        // when (操作):
        let opened = rx.recv().await.unwrap();
        let greeting = decode(rx.recv().await.unwrap());
        connection.send("my car was stolen");
        let reply = decode(rx.recv().await.unwrap());

        // then (期待する結果):
        assert_eq!(opened.kind, TransportEventKind::Open);
        assert_eq!(greeting.content, GREETING);
        assert_eq!(greeting.sender_id, OPERATOR_ID);
        assert_eq!(greeting.incident_id, Some(42));
        assert_eq!(
            reply.content,
            "Thanks for your message! We received: \"my car was stolen\""
        );
        assert_eq!(reply.created_at.as_deref(), Some("2025-01-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_simulated_close_emits_close_event() {
        // テスト項目: close 後は Close イベントが届き、送信は捨てられる
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = quick_transport().open(OpenRequest {
            url: "sim://chat/42".to_string(),
            events: EventSink::new(HandleId::new(3), tx),
        });
        assert_eq!(rx.recv().await.unwrap().kind, TransportEventKind::Open);

        // when (操作):
        connection.close();
        connection.close();
        connection.send("ignored");

        // then (期待する結果):
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind);
        }
        assert_eq!(kinds.last(), Some(&TransportEventKind::Close(Some(1000))));
        assert!(
            kinds
                .iter()
                .all(|k| !matches!(k, TransportEventKind::Message(m) if m.contains("ignored")))
        );
    }

    #[tokio::test]
    async fn test_close_before_greeting_skips_greeting() {
        // テスト項目: 挨拶の前に close すると挨拶は届かず Close だけが届く
        // given (前提条件):
        let transport = SimulatedTransport::with_clock(
            SimulatedConfig {
                greeting_delay: Duration::from_secs(60),
                reply_delay: Duration::from_millis(1),
                incident_id: None,
            },
            Arc::new(FixedClock::new(1735689600000)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connection = transport.open(OpenRequest {
            url: "sim://chat/42".to_string(),
            events: EventSink::new(HandleId::new(4), tx),
        });
        assert_eq!(rx.recv().await.unwrap().kind, TransportEventKind::Open);

        // when (操作):
        connection.close();

        // then (期待する結果):
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind);
        }
        assert_eq!(kinds, vec![TransportEventKind::Close(Some(1000))]);
    }

    #[tokio::test]
    async fn test_message_sent_before_greeting_is_answered_after_it() {
        // テスト項目: 挨拶の前に送ったメッセージも挨拶の後に返信される
        // given (前提条件):
        let transport = SimulatedTransport::with_clock(
            SimulatedConfig {
                greeting_delay: Duration::from_millis(50),
                reply_delay: Duration::from_millis(1),
                incident_id: None,
            },
            Arc::new(FixedClock::new(1735689600000)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = transport.open(OpenRequest {
            url: "sim://chat/42".to_string(),
            events: EventSink::new(HandleId::new(5), tx),
        });
        assert_eq!(rx.recv().await.unwrap().kind, TransportEventKind::Open);

        // when (操作):
        connection.send("early");
        let first = decode(rx.recv().await.unwrap());
        let second = decode(rx.recv().await.unwrap());

        // then (期待する結果):
        assert_eq!(first.content, GREETING);
        assert_eq!(
            second.content,
            "Thanks for your message! We received: \"early\""
        );
    }

    #[test]
    fn test_redact_token_strips_query() {
        // テスト項目: ログ用 URL からクエリ（トークン）が除去される
        // given (前提条件):
        let url = "wss://example.test/chat/1?token=secret";

        // when (操作):
        let redacted = redact_token(url);

        // then (期待する結果):
        assert_eq!(redacted, "wss://example.test/chat/1");
    }
}
