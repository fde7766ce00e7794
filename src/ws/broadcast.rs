//! Best-effort fan-out of server envelopes to group members.
//!
//! Delivery runs over each connection's mpsc channel, so a slow or dead peer
//! can never block the registry or other recipients. A failed send means that
//! peer's writer task is gone; its own session task owns the cleanup, so the
//! failure is logged and the loop moves on.

use axum::extract::ws::Message;

use super::protocol::ServerEnvelope;
use super::registry::ConnectionRegistry;
use super::ConnectionSender;

/// Broadcast one envelope to every live connection in a group, optionally
/// excluding a single connection id. Never fails: per-recipient errors are
/// logged and skipped, and never force a deregistration from this path.
pub fn broadcast_to_group(
    registry: &ConnectionRegistry,
    group_id: i64,
    envelope: &ServerEnvelope,
    exclude_connection_id: Option<u64>,
) {
    let text = match serde_json::to_string(envelope) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize broadcast envelope");
            return;
        }
    };
    let msg = Message::Text(text.into());

    for conn in registry.group_members(group_id) {
        if exclude_connection_id == Some(conn.connection_id) {
            continue;
        }
        if conn.sender.send(msg.clone()).is_err() {
            tracing::debug!(
                connection_id = conn.connection_id,
                group_id,
                "Skipping closed connection during broadcast"
            );
        }
    }
}

/// Send one envelope to a single connection (init acks, validation errors).
pub fn send_to_connection(sender: &ConnectionSender, envelope: &ServerEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(text) => {
            let _ = sender.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize envelope");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::db::models::User;

    fn test_user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            is_active: true,
            avatar_url: None,
        }
    }

    fn system(content: &str) -> ServerEnvelope {
        ServerEnvelope::SystemMessage {
            content: content.to_string(),
        }
    }

    fn recv_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> String {
        match rx.try_recv().expect("expected a frame") {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn delivers_to_every_group_member() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(test_user(1, "alice"), 1, tx_a);
        registry.register(test_user(2, "bob"), 1, tx_b);

        broadcast_to_group(&registry, 1, &system("hello"), None);

        assert!(recv_text(&mut rx_a).contains("hello"));
        assert!(recv_text(&mut rx_b).contains("hello"));
    }

    #[test]
    fn one_dead_recipient_does_not_stop_the_rest() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(test_user(1, "alice"), 1, tx_a);
        let dead_id = registry.register(test_user(2, "bob"), 1, tx_dead);
        registry.register(test_user(3, "carol"), 1, tx_b);

        // Simulate a peer whose writer task already exited.
        drop(rx_dead);

        broadcast_to_group(&registry, 1, &system("still here"), None);

        assert!(recv_text(&mut rx_a).contains("still here"));
        assert!(recv_text(&mut rx_b).contains("still here"));
        // The dead peer is not deregistered by the broadcast path.
        assert!(registry.contains(dead_id));
    }

    #[test]
    fn excluded_connection_is_skipped() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = registry.register(test_user(1, "alice"), 1, tx_a);
        registry.register(test_user(2, "bob"), 1, tx_b);

        broadcast_to_group(&registry, 1, &system("not for alice"), Some(a));

        assert!(rx_a.try_recv().is_err());
        assert!(recv_text(&mut rx_b).contains("not for alice"));
    }

    #[test]
    fn other_groups_are_untouched() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register(test_user(1, "alice"), 1, tx_a);
        registry.register(test_user(2, "bob"), 2, tx_b);

        broadcast_to_group(&registry, 1, &system("group one only"), None);

        assert!(recv_text(&mut rx_a).contains("group one only"));
        assert!(rx_b.try_recv().is_err());
    }
}
