//! Utilities shared by the TrustLink packages.

pub mod logger;
pub mod time;
