//! Conversation message entity.

use super::value_object::{MessageId, Timestamp};

/// Who authored a message, from the point of view of this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Originator {
    /// Written on this device (or by the same user elsewhere)
    Local,
    /// Written by the counterpart, usually an operator
    Remote,
}

/// One entry of the conversation log. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub originator: Originator,
    pub sent_at: Timestamp,
    pub sender_name: Option<String>,
}

impl Message {
    /// Optimistic echo of a message this client is about to send
    pub fn local_echo(text: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: MessageId::new(now.value()),
            text: text.into(),
            originator: Originator::Local,
            sent_at: now,
            sender_name: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.originator == Originator::Local
    }
}
