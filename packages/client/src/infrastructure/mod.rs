//! Infrastructure layer: wire formats, transports and the login API.

pub mod auth_api;
pub mod dto;
pub mod transport;
