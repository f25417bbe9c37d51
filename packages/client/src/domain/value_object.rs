//! Value objects used by the session and the wire layer.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("conversation target must not be empty")]
    EmptyTarget,

    #[error("credential must not be empty")]
    EmptyCredential,
}

/// Identifier of the remote conversation a session attaches to (an incident id)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationTarget(String);

impl ConversationTarget {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueObjectError> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(ValueObjectError::EmptyTarget);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric incident id, when the target is one
    pub fn as_incident_id(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl TryFrom<String> for ConversationTarget {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque bearer token
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    const GUEST_PREFIX: &'static str = "guest-token-";

    pub fn new(value: impl Into<String>) -> Result<Self, ValueObjectError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueObjectError::EmptyCredential);
        }
        Ok(Self(value))
    }

    /// Locally generated placeholder used when nobody is logged in
    pub fn guest() -> Self {
        Self(format!("{}{}", Self::GUEST_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with(Self::GUEST_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_guest() {
            f.write_str("Credential(guest)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

/// Message identifier: the backend's id, or a local clock reading for echoes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Backend user id of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(i64);

impl SenderId {
    /// Id the backend uses for the reporting client itself
    pub const CLIENT: SenderId = SenderId(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self::CLIENT
    }
}

/// Unix timestamp in milliseconds (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Identity of one opened transport connection
///
/// Every `open` gets a fresh id so events from a superseded connection can
/// be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
