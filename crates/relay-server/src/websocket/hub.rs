//! Shared relay state: the connection registry and the color pool.
//!
//! Both live behind one mutex so that every mutation (register, unregister,
//! take, release) is mutually exclusive with every other and a broadcast
//! snapshot never sees a half-applied change. The lock is held only for
//! map and queue operations, never across an await or a socket write.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use parking_lot::Mutex;
use relay_core::{Color, ColorPool};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection::{Connection, ConnectionId, Outbound};
use super::registry::ConnectionRegistry;
use crate::metrics::RELAY_POOL_EXHAUSTED_TOTAL;

struct HubState {
    registry: ConnectionRegistry,
    colors: ColorPool,
}

/// Owner of all cross-connection state.
pub struct Hub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    send_queue_capacity: usize,
}

impl Hub {
    /// Create a hub handing out colors from `colors`.
    ///
    /// `send_queue_capacity` bounds each connection's outbound queue and is
    /// clamped to at least 1.
    pub fn new(colors: ColorPool, send_queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState {
                registry: ConnectionRegistry::new(),
                colors,
            }),
            next_id: AtomicU64::new(1),
            send_queue_capacity: send_queue_capacity.max(1),
        }
    }

    /// Accept a new client.
    ///
    /// Takes a color if one is left, opens the connection and registers it,
    /// all under the hub lock. An exhausted pool does not reject the client:
    /// it joins without a color and still sends and receives broadcasts.
    ///
    /// Returns the connection and the receiving end of its outbound queue.
    pub fn accept(&self, remote: Option<SocketAddr>) -> (Arc<Connection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.send_queue_capacity);
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(Connection::new(id, remote, tx));

        let mut state = self.state.lock();
        match state.colors.take() {
            Some(color) => {
                let _ = connection.assign_color(color);
            }
            None => {
                warn!(conn_id = %id, "color pool exhausted, client joins without a color");
                counter!(RELAY_POOL_EXHAUSTED_TOTAL).increment(1);
            }
        }
        let _ = connection.mark_open();
        let _ = state.registry.register(connection.clone());
        drop(state);

        debug!(conn_id = %id, color = ?connection.color(), "connection registered");
        (connection, rx)
    }

    /// Close-path cleanup: mark the connection closed, unregister it and
    /// return its color to the pool.
    ///
    /// Runs at most once per connection; later calls return `false`.
    pub fn disconnect(&self, connection: &Connection) -> bool {
        if !connection.mark_closed() {
            return false;
        }
        {
            let mut state = self.state.lock();
            let _ = state.registry.unregister(connection.id());
            if let Some(color) = connection.color() {
                let _ = state.colors.release(color.clone());
            }
        }
        connection.close();
        debug!(conn_id = %connection.id(), "connection unregistered");
        true
    }

    /// Connections a broadcast starting now must reach.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.state.lock().registry.snapshot()
    }

    /// Look up a live connection.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.state.lock().registry.get(id).cloned()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Colors left in the pool.
    pub fn available_colors(&self) -> usize {
        self.state.lock().colors.available()
    }

    /// Distinct colors the pool started with.
    pub fn palette_size(&self) -> usize {
        self.state.lock().colors.palette_size()
    }

    /// Colors held by registered connections.
    pub fn assigned_colors(&self) -> Vec<Color> {
        self.state
            .lock()
            .registry
            .snapshot()
            .iter()
            .filter_map(|c| c.color().cloned())
            .collect()
    }

    /// Whether `color` is currently in the pool.
    pub fn color_available(&self, color: &Color) -> bool {
        self.state.lock().colors.contains(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ConnectionState;
    use relay_core::logging::capture_logs;
    use std::collections::HashSet;

    fn hub(colors: &[&str]) -> Hub {
        Hub::new(ColorPool::new(colors.iter().copied()), 8)
    }

    #[test]
    fn accept_assigns_color_and_registers() {
        let hub = hub(&["red", "green"]);
        let (conn, _rx) = hub.accept(None);
        assert_eq!(conn.color().map(Color::as_str), Some("red"));
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.available_colors(), 1);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let hub = hub(&["red"]);
        let (a, _ra) = hub.accept(None);
        let (b, _rb) = hub.accept(None);
        assert!(a.id() < b.id());
    }

    #[test]
    fn disconnect_releases_color_and_unregisters() {
        let hub = hub(&["red", "green"]);
        let (a, _ra) = hub.accept(None);
        assert!(hub.disconnect(&a));
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.available_colors(), 2);
        assert!(hub.color_available(&Color::from("red")));
        assert_eq!(a.state(), ConnectionState::Closed);
        assert!(a.is_closing());
    }

    #[test]
    fn disconnect_runs_once() {
        let hub = hub(&["red"]);
        let (a, _ra) = hub.accept(None);
        assert!(hub.disconnect(&a));
        assert!(!hub.disconnect(&a));
        assert!(!hub.disconnect(&a));
        assert_eq!(hub.available_colors(), 1);
    }

    #[test]
    fn released_color_is_reassigned() {
        let hub = hub(&["red"]);
        let (a, _ra) = hub.accept(None);
        assert_eq!(a.color().map(Color::as_str), Some("red"));
        let _ = hub.disconnect(&a);

        let (b, _rb) = hub.accept(None);
        assert_eq!(b.color().map(Color::as_str), Some("red"));
        assert!(hub.snapshot().iter().all(|c| c.id() != a.id()));
    }

    #[test]
    fn exhausted_pool_accepts_colorless() {
        let (logs, _guard) = capture_logs();
        let hub = hub(&["red", "green"]);
        let (_a, _ra) = hub.accept(None);
        let (_b, _rb) = hub.accept(None);
        let (c, _rc) = hub.accept(None);

        assert!(c.color().is_none());
        assert!(c.is_open());
        assert_eq!(hub.connection_count(), 3);
        assert!(logs.has_event(tracing::Level::WARN, "color pool exhausted"));
    }

    #[test]
    fn colorless_disconnect_returns_nothing() {
        let hub = hub(&["red"]);
        let (a, _ra) = hub.accept(None);
        let (b, _rb) = hub.accept(None);
        assert!(b.color().is_none());

        let _ = hub.disconnect(&b);
        assert_eq!(hub.available_colors(), 0);
        let _ = hub.disconnect(&a);
        assert_eq!(hub.available_colors(), 1);
    }

    #[test]
    fn empty_palette_everyone_colorless() {
        let hub = hub(&[]);
        let (a, _ra) = hub.accept(None);
        assert!(a.color().is_none());
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn colors_conserved_after_churn() {
        let hub = Hub::new(ColorPool::with_default_palette(), 8);
        let mut live = Vec::new();
        for _ in 0..5 {
            live.push(hub.accept(None));
        }
        for (conn, _rx) in live.drain(..2) {
            let _ = hub.disconnect(&conn);
        }
        assert_eq!(
            hub.available_colors() + hub.assigned_colors().len(),
            hub.palette_size()
        );
        let assigned: HashSet<_> = hub.assigned_colors().into_iter().collect();
        assert_eq!(assigned.len(), 3);
    }

    #[test]
    fn zero_queue_capacity_clamped() {
        let hub = Hub::new(ColorPool::with_default_palette(), 0);
        let (conn, _rx) = hub.accept(None);
        assert!(conn.send_text("fits").is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_then_disconnects() {
        let hub = Arc::new(Hub::new(ColorPool::with_default_palette(), 8));

        let mut handles = Vec::new();
        for _ in 0..7 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move { hub.accept(None) }));
        }
        let mut accepted = Vec::new();
        for h in handles {
            accepted.push(h.await.unwrap());
        }
        assert_eq!(hub.connection_count(), 7);
        let colors: HashSet<_> = accepted
            .iter()
            .filter_map(|(c, _)| c.color().cloned())
            .collect();
        assert_eq!(colors.len(), 7);

        let mut handles = Vec::new();
        for (conn, _rx) in accepted.drain(..3) {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move { hub.disconnect(&conn) }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(hub.connection_count(), 4);
        assert_eq!(hub.available_colors(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_past_palette_leave_one_colorless() {
        let hub = Arc::new(Hub::new(ColorPool::with_default_palette(), 8));
        let palette = hub.palette_size();
        let barrier = Arc::new(tokio::sync::Barrier::new(palette + 1));

        let mut handles = Vec::new();
        for _ in 0..=palette {
            let hub = hub.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                let _ = barrier.wait().await;
                hub.accept(None)
            }));
        }
        let mut accepted = Vec::new();
        for h in handles {
            accepted.push(h.await.unwrap());
        }

        assert_eq!(hub.connection_count(), palette + 1);
        assert_eq!(hub.available_colors(), 0);
        let colorless = accepted.iter().filter(|(c, _)| c.color().is_none()).count();
        assert_eq!(colorless, 1);
        let colors: HashSet<_> = accepted
            .iter()
            .filter_map(|(c, _)| c.color().cloned())
            .collect();
        assert_eq!(colors.len(), palette);
        assert!(accepted.iter().all(|(c, _)| c.is_open()));
    }
}
