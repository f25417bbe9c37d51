//! Message formatting utilities for client display.

use trustlink_shared::time::timestamp_to_rfc3339;

use crate::domain::{ConnectionState, ConversationTarget, Message, Originator};

const RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the banner shown once the client starts
    ///
    /// # Arguments
    ///
    /// * `target` - The incident the session is attached to
    /// * `logged_in` - Whether a user credential is in use (guest otherwise)
    pub fn format_welcome(target: &ConversationTarget, logged_in: bool) -> String {
        let who = if logged_in { "logged in" } else { "guest" };
        format!(
            "\nChat for incident {} ({}). Type messages and press Enter to send.\n\
             Commands: /login <email> <password>, /logout, /quit\n",
            target, who
        )
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    ///
    /// # Returns
    ///
    /// A formatted block with author, content and send time
    pub fn format_message(message: &Message) -> String {
        let author = match (message.originator, message.sender_name.as_deref()) {
            (Originator::Local, _) => "me",
            (Originator::Remote, Some(name)) => name,
            (Originator::Remote, None) => "operator",
        };
        let sent_at = timestamp_to_rfc3339(message.sent_at.value())
            .unwrap_or_else(|| message.sent_at.value().to_string());

        format!(
            "\n{RULE}\n@{}: {}\nsent at {}\n{RULE}\n",
            author, message.text, sent_at
        )
    }

    /// Format a connection state transition
    pub fn format_state(state: &ConnectionState) -> String {
        match state {
            ConnectionState::Idle => "\n* Not connected\n".to_string(),
            ConnectionState::Connecting => "\n* Connecting...\n".to_string(),
            ConnectionState::Open => "\n* Connected to operator chat\n".to_string(),
            ConnectionState::Closed => "\n* Connection closed\n".to_string(),
            ConnectionState::Failed(reason) => format!("\n! Connection failed: {}\n", reason),
        }
    }

    /// Format the notice shown when a line could not be sent
    pub fn format_not_sent(state: &ConnectionState) -> String {
        format!("\n(not sent: session is {})\n", state)
    }

    /// Format a local notice (login result, usage hints)
    pub fn format_notice(text: &str) -> String {
        format!("\n* {}\n", text)
    }
}
