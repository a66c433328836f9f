//! REST API over the engine and the store

pub mod handlers;
pub mod router;
pub mod state;
