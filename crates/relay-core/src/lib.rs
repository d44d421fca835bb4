//! # relay-core
//!
//! Foundation types shared by the relay crates:
//!
//! - **Colors**: [`Color`] tokens and the [`ColorPool`] they are drawn from
//! - **Messages**: [`Inbound`] frames and the broadcast [`Envelope`]
//! - **Escaping**: [`html_entities`] for collaborators that render markup
//! - **Logging**: `tracing` subscriber setup and a capture layer for tests

#![deny(unsafe_code)]

pub mod colors;
pub mod escape;
pub mod logging;
pub mod message;

pub use colors::{Color, ColorPool, DEFAULT_PALETTE};
pub use escape::html_entities;
pub use message::{Envelope, EnvelopeData, Inbound};
