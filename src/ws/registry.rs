use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::ConnectionSender;
use crate::db::models::User;

/// One live WebSocket session, bound to a single (user, group) pair for its
/// entire lifetime. Reconnecting to a different group means a new entry.
#[derive(Clone)]
pub struct Connection {
    pub connection_id: u64,
    pub user: User,
    pub group_id: i64,
    pub sender: ConnectionSender,
}

/// Shared table of active chat connections, keyed by a monotonically
/// assigned connection id that is never reused within the process lifetime.
/// Constructed once at startup and shared with every session task; DashMap
/// serializes each map operation so mutations never observe a torn state.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    connections: DashMap<u64, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            connections: DashMap::new(),
        }
    }

    /// Allocate the next connection id and insert the entry.
    pub fn register(&self, user: User, group_id: i64, sender: ConnectionSender) -> u64 {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let username = user.username.clone();
        self.connections.insert(
            connection_id,
            Connection {
                connection_id,
                user,
                group_id,
                sender,
            },
        );
        tracing::debug!(
            connection_id,
            username = %username,
            group_id,
            "Connection registered"
        );
        connection_id
    }

    /// Remove an entry. Returns the removed connection on the first call and
    /// None on any repeat, so racing cleanup paths stay idempotent and the
    /// caller can gate its leave broadcast on the Some case.
    pub fn deregister(&self, connection_id: u64) -> Option<Connection> {
        let removed = self.connections.remove(&connection_id).map(|(_, conn)| conn);
        if removed.is_some() {
            tracing::debug!(connection_id, "Connection deregistered");
        }
        removed
    }

    /// Point-in-time snapshot of one group's connections. Callers send on
    /// the snapshot, never while holding a reference into the live map.
    pub fn group_members(&self, group_id: i64) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|entry| entry.value().group_id == group_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Look up the owning user of a connection.
    pub fn user_for(&self, connection_id: u64) -> Option<User> {
        self.connections
            .get(&connection_id)
            .map(|entry| entry.user.clone())
    }

    pub fn contains(&self, connection_id: u64) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;

    fn test_user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            is_active: true,
            avatar_url: None,
        }
    }

    fn test_sender() -> ConnectionSender {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let registry = ConnectionRegistry::new();
        let first = registry.register(test_user(1, "alice"), 1, test_sender());
        let second = registry.register(test_user(2, "bob"), 1, test_sender());
        assert!(second > first);

        registry.deregister(first);
        let third = registry.register(test_user(1, "alice"), 1, test_sender());
        assert!(third > second);
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(test_user(1, "alice"), 1, test_sender());

        assert!(registry.deregister(id).is_some());
        assert!(registry.deregister(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn group_snapshot_is_scoped_to_the_group() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(test_user(1, "alice"), 1, test_sender());
        let b = registry.register(test_user(2, "bob"), 1, test_sender());
        registry.register(test_user(3, "carol"), 2, test_sender());

        let members = registry.group_members(1);
        let mut ids: Vec<u64> = members.iter().map(|c| c.connection_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![a, b]);
        assert!(registry.group_members(99).is_empty());
    }

    #[test]
    fn user_lookup_follows_registration() {
        let registry = ConnectionRegistry::new();
        let id = registry.register(test_user(7, "alice"), 1, test_sender());

        assert_eq!(registry.user_for(id).unwrap().id, 7);
        registry.deregister(id);
        assert!(registry.user_for(id).is_none());
    }

    #[test]
    fn concurrent_churn_keeps_the_map_exact() {
        let registry = Arc::new(ConnectionRegistry::new());

        let handles: Vec<_> = (0..8i64)
            .map(|group| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..200 {
                        let id = registry.register(test_user(group, "churn"), group, test_sender());
                        if i % 2 == 0 {
                            assert!(registry.deregister(id).is_some());
                        } else {
                            kept.push(id);
                        }
                    }
                    kept
                })
            })
            .collect();

        let kept: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // No lost entries, no ghosts: exactly the ids that were never
        // deregistered remain.
        assert_eq!(registry.len(), kept.len());
        for id in kept {
            assert!(registry.contains(id));
        }
    }
}
