//! Data Transfer Objects (DTOs) for the chat backend.
//!
//! DTOs are organized by protocol:
//! - `websocket`: chat frames
//! - `http`: REST API request and response bodies

pub mod conversion;
pub mod http;
pub mod websocket;
