//! Connection lifecycle, from upgrade through disconnect.
//!
//! Each upgraded socket runs on its own task: a reader loop dispatching
//! inbound frames to the [`MessageRouter`] and a writer task draining the
//! connection's outbound queue. Close handling lives in [`ConnectionGuard`]
//! so it runs exactly once on every exit path, including panics and aborts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::Inbound;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{Connection, Outbound};
use super::hub::Hub;
use super::router::MessageRouter;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// How long the writer gets to flush after the reader loop ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound frame, reduced to what the relay acts on.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    /// Text or binary payload for the router.
    Data(Inbound),
    /// Ping or pong. Answered by the transport.
    Control,
    /// The peer asked to close.
    Close,
}

/// Map a transport message onto a [`Frame`].
pub fn classify(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Data(Inbound::Text(text.as_str().to_owned())),
        Message::Binary(data) => Frame::Data(Inbound::Binary(data)),
        Message::Ping(_) | Message::Pong(_) => Frame::Control,
        Message::Close(_) => Frame::Close,
    }
}

/// Drives connections through `Connecting -> Open -> Closed`.
pub struct LifecycleManager {
    hub: Arc<Hub>,
    router: MessageRouter,
}

impl LifecycleManager {
    /// Manager for connections joining `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        let router = MessageRouter::new(hub.clone());
        Self { hub, router }
    }

    /// Shared relay state.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Open and register a new connection. `origin` is the upgrade request's
    /// `Origin` header, logged for auditing only.
    ///
    /// The returned guard closes the connection when dropped.
    pub fn on_accept(
        self: &Arc<Self>,
        remote: Option<SocketAddr>,
        origin: Option<&str>,
    ) -> (ConnectionGuard, mpsc::Receiver<Outbound>) {
        let (connection, rx) = self.hub.accept(remote);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            conn_id = %connection.id(),
            remote = ?remote,
            origin,
            color = connection.color().map(relay_core::Color::as_str),
            "client connected"
        );
        let guard = ConnectionGuard {
            manager: self.clone(),
            connection,
        };
        (guard, rx)
    }

    /// Route one inbound frame. Returns `false` once the peer asked to close.
    pub fn on_message(&self, connection: &Connection, message: Message) -> bool {
        match classify(message) {
            Frame::Data(inbound) => {
                let _ = self.router.dispatch(connection, inbound, Utc::now());
                true
            }
            Frame::Control => true,
            Frame::Close => {
                debug!(conn_id = %connection.id(), "client sent close frame");
                false
            }
        }
    }

    /// Close-path cleanup. Only the first call per connection has any effect.
    pub fn on_close(&self, connection: &Connection) -> bool {
        if !self.hub.disconnect(connection) {
            return false;
        }
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
        info!(
            conn_id = %connection.id(),
            dropped = connection.drop_count(),
            "client disconnected"
        );
        true
    }

    /// Run a session for an upgraded socket until the peer leaves, the
    /// transport fails, the connection is closed for falling behind, or
    /// `shutdown` fires.
    #[instrument(skip_all, fields(conn_id))]
    pub async fn run(
        self: Arc<Self>,
        socket: WebSocket,
        remote: Option<SocketAddr>,
        origin: Option<String>,
        shutdown: CancellationToken,
    ) {
        let (guard, outbound_rx) = self.on_accept(remote, origin.as_deref());
        let connection = guard.connection().clone();
        let _ = tracing::Span::current()
            .record("conn_id", tracing::field::display(connection.id()));

        let (ws_tx, mut ws_rx) = socket.split();
        let mut writer = tokio::spawn(write_loop(ws_tx, outbound_rx, connection.clone()));

        let closing = connection.closing_token();
        loop {
            tokio::select! {
                () = closing.cancelled() => break,
                () = shutdown.cancelled() => {
                    debug!("server shutting down, closing connection");
                    break;
                }
                next = ws_rx.next() => match next {
                    Some(Ok(message)) => {
                        if !self.on_message(&connection, message) {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "receive failed");
                        break;
                    }
                    None => break,
                },
            }
        }

        connection.close();
        drop(guard);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            warn!("writer did not finish in time, aborting");
            writer.abort();
        }
    }
}

/// Forward queued frames to the socket until the connection closes, then
/// flush what is left and send a close frame.
async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    connection: Arc<Connection>,
) where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let closing = connection.closing_token();
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = ws_tx.send(frame.into_message()).await {
                    debug!(conn_id = %connection.id(), error = %e, "send failed");
                    connection.close();
                    return;
                }
            }
            () = closing.cancelled() => {
                while let Ok(frame) = outbound_rx.try_recv() {
                    if ws_tx.send(frame.into_message()).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
    connection.close();
}

/// Owns a connection's registration. Dropping it runs the close path.
pub struct ConnectionGuard {
    manager: Arc<LifecycleManager>,
    connection: Arc<Connection>,
}

impl ConnectionGuard {
    /// The guarded connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.manager.on_close(&self.connection);
    }
}
