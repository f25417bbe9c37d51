//! Inbound frame decoding and classification.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use trustlink_shared::time::Clock;

use crate::{
    domain::{Message, Originator, SenderId, Timestamp},
    error::DecodeError,
    infrastructure::dto::websocket::InboundFrame,
};

/// Outcome of handling one raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// New message for the store
    Append(Message),
    /// The backend echoed a message already shown optimistically
    Confirmed,
    /// Payload was not a chat frame
    Dropped,
}

#[derive(Debug)]
struct PendingEcho {
    text: String,
    sent_at: Timestamp,
}

/// Turns raw transport payloads into messages
///
/// Frames from `local_sender_id` are matched against pending local echoes:
/// the oldest pending echo with the same text, sent within `echo_window`,
/// is confirmed and the frame is not appended again.
pub struct InboundDispatcher {
    local_sender_id: SenderId,
    echo_window: Duration,
    pending: VecDeque<PendingEcho>,
    clock: Arc<dyn Clock>,
}

impl InboundDispatcher {
    pub fn new(local_sender_id: SenderId, echo_window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            local_sender_id,
            echo_window,
            pending: VecDeque::new(),
            clock,
        }
    }

    /// Remember an optimistic echo so its server copy can be recognized
    pub fn track_echo(&mut self, message: &Message) {
        self.expire();
        self.pending.push_back(PendingEcho {
            text: message.text.clone(),
            sent_at: message.sent_at,
        });
    }

    /// Forget all pending echoes (used on conversation switch)
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    pub fn pending_echoes(&self) -> usize {
        self.pending.len()
    }

    /// Decode and classify one raw payload. Never fails; bad payloads are
    /// logged and reported as [`Dispatch::Dropped`].
    pub fn dispatch(&mut self, raw: &str) -> Dispatch {
        let frame = match decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Dropping inbound payload ({}): {}", e, raw);
                return Dispatch::Dropped;
            }
        };

        let originator = if SenderId::new(frame.sender_id) == self.local_sender_id {
            Originator::Local
        } else {
            Originator::Remote
        };

        if originator == Originator::Local && self.confirm(&frame.content) {
            tracing::debug!("Server confirmed local message");
            return Dispatch::Confirmed;
        }

        let now = Timestamp::new(self.clock.now_millis());
        Dispatch::Append(frame.into_message(originator, now))
    }

    fn confirm(&mut self, content: &str) -> bool {
        self.expire();
        match self.pending.iter().position(|p| p.text == content) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn expire(&mut self) {
        let window = i64::try_from(self.echo_window.as_millis()).unwrap_or(i64::MAX);
        let oldest_allowed = self.clock.now_millis().saturating_sub(window);
        while self
            .pending
            .front()
            .is_some_and(|p| p.sent_at.value() < oldest_allowed)
        {
            self.pending.pop_front();
        }
    }
}

fn decode(raw: &str) -> Result<InboundFrame, DecodeError> {
    Ok(serde_json::from_str(raw)?)
}
