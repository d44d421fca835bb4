//! WebSocket relay: connections, shared state, routing and lifecycle.

pub mod connection;
pub mod hub;
pub mod lifecycle;
pub mod registry;
pub mod router;
