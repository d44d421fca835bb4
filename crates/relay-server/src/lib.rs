//! # relay-server
//!
//! Axum HTTP + `WebSocket` broadcast relay.
//!
//! - `WebSocket` endpoint on `/` and `/ws`: text is echoed and broadcast to
//!   every client in a JSON envelope, binary is echoed to its sender
//! - Per-client colors from a shared pool, returned on disconnect
//! - `/health` and Prometheus `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::RelayServer;
