//! Chat session: the controller and the pieces it owns.

mod controller;
mod dispatcher;
mod store;

pub use controller::SessionController;
pub use dispatcher::{Dispatch, InboundDispatcher};
pub use store::MessageStore;
