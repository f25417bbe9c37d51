//! Conversion logic between DTOs and domain entities.

use trustlink_shared::time::parse_rfc3339_millis;

use crate::domain::{Message, MessageId, Originator, Timestamp};
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain Entity
// ========================================

impl dto::InboundFrame {
    /// Build the domain message for this frame.
    ///
    /// A missing or zero id and a missing or unparseable `created_at` fall
    /// back to `received_at`.
    pub fn into_message(self, originator: Originator, received_at: Timestamp) -> Message {
        let id = match self.id {
            Some(id) if id != 0 => MessageId::new(id),
            _ => MessageId::new(received_at.value()),
        };
        let sent_at = self
            .created_at
            .as_deref()
            .and_then(parse_rfc3339_millis)
            .map(Timestamp::new)
            .unwrap_or(received_at);

        Message {
            id,
            text: self.content,
            originator,
            sent_at,
            sender_name: self.sender_name,
        }
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&str> for dto::OutboundFrame {
    fn from(text: &str) -> Self {
        Self {
            message: text.to_string(),
        }
    }
}
