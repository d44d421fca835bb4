//! The set of connections that broadcasts currently reach.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId};

/// Live connections keyed by id.
///
/// Not synchronized on its own: the hub keeps it behind the same lock as the
/// color pool.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and return the id to unregister it with.
    ///
    /// Registering an id that is already present replaces the old entry, so
    /// an id never appears twice.
    pub fn register(&mut self, connection: Arc<Connection>) -> ConnectionId {
        let id = connection.id();
        let _ = self.connections.insert(id, connection);
        id
    }

    /// Remove a connection. Absent ids are ignored.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id)
    }

    /// Point-in-time copy of the members, ordered by id (ids are allocated
    /// in arrival order).
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Look up a member.
    pub fn get(&self, id: ConnectionId) -> Option<&Arc<Connection>> {
        self.connections.get(&id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
