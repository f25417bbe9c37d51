//! Domain model of a chat session.
//!
//! Pure types and decisions with no I/O: value objects, the message entity,
//! the connection state machine's states and the reconnect policy.

mod entity;
mod reconnect;
mod state;
mod value_object;

pub use entity::{Message, Originator};
pub use reconnect::ReconnectPolicy;
pub use state::ConnectionState;
pub use value_object::{
    ConversationTarget, Credential, HandleId, MessageId, SenderId, Timestamp, ValueObjectError,
};
