//! Chat session client for TrustLink incident conversations.
//!
//! The library owns the lifecycle of one chat session at a time: it opens a
//! transport connection scoped to an incident, keeps an ordered in-memory
//! conversation log, and reconnects when the credential changes.

// layers
pub mod domain;
pub mod infrastructure;
pub mod session;

pub mod auth;
pub mod config;
pub mod error;

// terminal client
mod formatter;
mod runner;
mod ui;

pub use runner::{Backend, ClientOptions, run_client};
