//! Echo and broadcast of inbound messages.
//!
//! Text is echoed raw to its sender and then broadcast, wrapped in an
//! [`Envelope`], to every registered connection including the sender. Binary
//! is echoed to the sender only.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use metrics::counter;
use relay_core::{Envelope, Inbound};
use tracing::{debug, instrument, warn};

use super::connection::{Connection, SendError};
use super::hub::Hub;
use crate::metrics::{
    RELAY_BINARY_MESSAGES_TOTAL, RELAY_BROADCAST_DELIVERIES_TOTAL, RELAY_SEND_FAILURES_TOTAL,
    RELAY_TEXT_MESSAGES_TOTAL,
};

/// Outcome of relaying one message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Whether the echo to the sender was queued.
    pub echoed: bool,
    /// Connections in the broadcast snapshot.
    pub recipients: usize,
    /// Recipients the envelope was queued for.
    pub delivered: usize,
    /// Recipients that could not take the envelope.
    pub failed: usize,
}

/// Routes inbound messages through the hub.
pub struct MessageRouter {
    hub: Arc<Hub>,
}

impl MessageRouter {
    /// Router broadcasting to the members of `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Route a tagged message.
    pub fn dispatch(
        &self,
        source: &Connection,
        message: Inbound,
        received_at: DateTime<Utc>,
    ) -> RelayReport {
        match message {
            Inbound::Text(text) => self.on_text(source, &text, received_at),
            Inbound::Binary(data) => self.on_binary(source, data),
        }
    }

    /// Echo `text` raw to `source`, then broadcast the envelope to every
    /// registered connection.
    ///
    /// A failed send to one recipient is logged and skipped; the rest still
    /// receive the message.
    #[instrument(skip_all, fields(conn_id = %source.id(), len = text.len()))]
    pub fn on_text(
        &self,
        source: &Connection,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> RelayReport {
        counter!(RELAY_TEXT_MESSAGES_TOTAL).increment(1);
        debug!("received text message");

        let mut report = RelayReport {
            echoed: echo(source, source.send_text(text)),
            ..RelayReport::default()
        };

        let payload = match Envelope::message(text, received_at).to_json() {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize envelope");
                return report;
            }
        };

        let recipients = self.hub.snapshot();
        report.recipients = recipients.len();
        for conn in &recipients {
            match conn.send_text(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(target_conn = %conn.id(), error = %e, "failed to deliver broadcast");
                }
            }
        }

        counter!(RELAY_BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        if report.failed > 0 {
            counter!(RELAY_SEND_FAILURES_TOTAL).increment(report.failed as u64);
        }
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    /// Echo `data` back to `source`. Binary is never broadcast.
    #[instrument(skip_all, fields(conn_id = %source.id(), bytes = data.len()))]
    pub fn on_binary(&self, source: &Connection, data: Bytes) -> RelayReport {
        counter!(RELAY_BINARY_MESSAGES_TOTAL).increment(1);
        debug!("received binary message");
        RelayReport {
            echoed: echo(source, source.send_binary(data)),
            ..RelayReport::default()
        }
    }
}

fn echo(source: &Connection, result: Result<(), SendError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            counter!(RELAY_SEND_FAILURES_TOTAL).increment(1);
            warn!(conn_id = %source.id(), error = %e, "failed to echo to sender");
            false
        }
    }
}
