//! Inbound frames and the broadcast envelope.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A message received from a client, tagged by payload kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// UTF-8 text frame.
    Text(String),
    /// Raw binary frame.
    Binary(Bytes),
}

impl Inbound {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wrapper sent to every connection when a text message is broadcast.
///
/// Serializes as `{"type":"message","data":{"time":<ms>,"text":"..."}}`.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<'a> {
    /// Always `"message"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Message body.
    pub data: EnvelopeData<'a>,
}

/// Body of an [`Envelope`].
#[derive(Clone, Debug, Serialize)]
pub struct EnvelopeData<'a> {
    /// Arrival time in milliseconds since the Unix epoch.
    pub time: i64,
    /// The text as received, unmodified.
    pub text: &'a str,
}

impl<'a> Envelope<'a> {
    /// Envelope for `text` received at `received_at`.
    pub fn message(text: &'a str, received_at: DateTime<Utc>) -> Self {
        Self {
            kind: "message",
            data: EnvelopeData {
                time: received_at.timestamp_millis(),
                text,
            },
        }
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
