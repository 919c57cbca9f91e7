//! Per-order live event fan-out.

pub mod events;
pub mod manager;

pub use events::OrderEvent;
pub use manager::{ConnectionManager, LiveConnection, WsConnection};
