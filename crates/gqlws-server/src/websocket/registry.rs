//! Live connection registry, used by `/health` and the upgrade limit.

use std::sync::Arc;

use dashmap::DashMap;
use gqlws_core::ConnectionId;

use super::session::Session;

/// Connections currently served, indexed by connection ID.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Session>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Add a connection's session.
    pub fn add(&self, id: ConnectionId, session: Arc<Session>) {
        let _ = self.connections.insert(id, session);
    }

    /// Remove a connection by ID.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Live operations across every connection.
    pub fn subscription_count(&self) -> usize {
        self.connections
            .iter()
            .map(|entry| entry.value().live_count())
            .sum()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove() {
        let registry = ConnectionRegistry::new();
        registry.add(ConnectionId::from("c1"), Arc::new(Session::new()));
        assert_eq!(registry.connection_count(), 1);
        assert!(registry.remove(&ConnectionId::from("c1")));
        assert_eq!(registry.connection_count(), 0);
        assert!(!registry.remove(&ConnectionId::from("c1")));
    }

    #[test]
    fn remove_nonexistent_connection() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.remove(&ConnectionId::from("nope")));
    }

    #[test]
    fn counts_subscriptions_across_sessions() {
        let registry = ConnectionRegistry::new();
        let s1 = Arc::new(Session::new());
        let s2 = Arc::new(Session::new());
        let _ = s1.register_subscription("a");
        let _ = s1.register_subscription("b");
        let _ = s2.register_subscription("a");
        registry.add(ConnectionId::from("c1"), s1);
        registry.add(ConnectionId::from("c2"), s2.clone());
        assert_eq!(registry.subscription_count(), 3);

        let _ = s2.cancel_all();
        assert_eq!(registry.subscription_count(), 2);
    }
}
