//! A single live client session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;
use parking_lot::Mutex;
use relay_core::Color;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Registry key for a connection. Allocated in increasing order by the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw sequence number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw sequence number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0)
    }
}

/// Lifecycle state. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, not yet registered.
    Connecting,
    /// Registered and relaying.
    Open,
    /// Deregistered; never reopens.
    Closed,
}

/// A frame queued for the connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(Utf8Bytes),
    /// Binary frame.
    Binary(Bytes),
}

impl Outbound {
    /// Convert into a WebSocket message.
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(t) => Message::Text(t),
            Self::Binary(b) => Message::Binary(b),
        }
    }
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue is full; the connection is being closed.
    #[error("outbound queue full")]
    Full,
    /// The connection is closed or its writer is gone.
    #[error("connection closed")]
    Closed,
}

/// One client session.
///
/// Sending never waits on the peer: frames go onto a bounded queue drained
/// by the connection's writer task. A connection that cannot keep up is
/// closed rather than allowed to miss frames.
pub struct Connection {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    color: OnceLock<Color>,
    state: Mutex<ConnectionState>,
    tx: mpsc::Sender<Outbound>,
    closing: CancellationToken,
    connected_at: Instant,
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, remote: Option<SocketAddr>, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            remote,
            color: OnceLock::new(),
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            closing: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registry key.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, if the transport reported one.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Assigned color, if any.
    pub fn color(&self) -> Option<&Color> {
        self.color.get()
    }

    /// Assign the color. Only the first assignment takes effect.
    pub fn assign_color(&self, color: Color) -> bool {
        self.color.set(color).is_ok()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the connection is `Open`.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// `Connecting -> Open`. Returns `false` from any other state.
    pub fn mark_open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Open;
            true
        } else {
            false
        }
    }

    /// Move to `Closed`. Returns `true` only for the call that made the
    /// transition.
    pub fn mark_closed(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = ConnectionState::Closed;
        true
    }

    /// Queue a frame for the writer.
    pub fn send(&self, frame: Outbound) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                self.close();
                Err(SendError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(SendError::Closed)
            }
        }
    }

    /// Queue a text frame.
    pub fn send_text(&self, text: impl Into<Utf8Bytes>) -> Result<(), SendError> {
        self.send(Outbound::Text(text.into()))
    }

    /// Queue a binary frame.
    pub fn send_binary(&self, data: Bytes) -> Result<(), SendError> {
        self.send(Outbound::Binary(data))
    }

    /// Ask the session to shut down. Safe to call any number of times.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Whether [`close`](Self::close) has been requested.
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Token cancelled when the connection is asked to close.
    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// Frames refused because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Time since the connection was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("color", &self.color.get())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (Connection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Connection::new(ConnectionId::new(1), None, tx), rx)
    }

    #[test]
    fn id_display() {
        assert_eq!(ConnectionId::new(42).to_string(), "conn_42");
    }

    #[test]
    fn starts_connecting_without_color() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.color().is_none());
        assert!(!conn.is_closing());
    }

    #[test]
    fn color_assigned_once() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.assign_color(Color::from("red")));
        assert!(!conn.assign_color(Color::from("blue")));
        assert_eq!(conn.color().map(Color::as_str), Some("red"));
    }

    #[test]
    fn state_transitions() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.mark_open());
        assert!(!conn.mark_open());
        assert!(conn.is_open());
        assert!(conn.mark_closed());
        assert!(!conn.mark_closed());
        assert!(!conn.mark_open());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn close_from_connecting() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.mark_closed());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_text_and_binary() {
        let (conn, mut rx) = make_connection(4);
        let _ = conn.mark_open();
        conn.send_text("hello").unwrap();
        conn.send_binary(Bytes::from_static(&[1, 2, 3])).unwrap();

        assert_eq!(rx.recv().await, Some(Outbound::Text("hello".into())));
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Binary(Bytes::from_static(&[1, 2, 3])))
        );
    }

    #[test]
    fn full_queue_closes_connection() {
        let (conn, _rx) = make_connection(1);
        let _ = conn.mark_open();
        assert!(conn.send_text("one").is_ok());
        assert_eq!(conn.send_text("two"), Err(SendError::Full));
        assert_eq!(conn.drop_count(), 1);
        assert!(conn.is_closing());
    }

    #[test]
    fn dropped_receiver_is_closed() {
        let (conn, rx) = make_connection(4);
        let _ = conn.mark_open();
        drop(rx);
        assert_eq!(conn.send_text("x"), Err(SendError::Closed));
        assert!(conn.is_closing());
    }

    #[test]
    fn closed_connection_refuses_sends() {
        let (conn, mut rx) = make_connection(4);
        let _ = conn.mark_open();
        let _ = conn.mark_closed();
        assert_eq!(conn.send_text("late"), Err(SendError::Closed));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn outbound_into_message() {
        assert!(matches!(
            Outbound::Text("a".into()).into_message(),
            Message::Text(_)
        ));
        assert!(matches!(
            Outbound::Binary(Bytes::new()).into_message(),
            Message::Binary(_)
        ));
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection(1);
        let a = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > a);
    }
}
