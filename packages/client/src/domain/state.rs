//! Connection state of a session.

use std::fmt;

/// Lifecycle state of the session's single connection
///
/// `Idle → Connecting → Open → Closed`, with `Connecting`/`Open → Failed`
/// on a transport error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Failed(String),
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Whether a connection is being established or already usable
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    /// Displayable failure reason, if the session failed
    pub fn error(&self) -> Option<&str> {
        match self {
            ConnectionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::Closed => f.write_str("closed"),
            ConnectionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
