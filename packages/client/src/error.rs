//! Error types for the chat session client.

use thiserror::Error;

use crate::domain::ValueObjectError;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured endpoint cannot be turned into a connection URL
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A value failed domain validation
    #[error("Invalid value: {0}")]
    InvalidValue(#[from] ValueObjectError),

    /// The backend rejected the login
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why an inbound frame was dropped
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
