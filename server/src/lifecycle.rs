//! Disconnect cleanup

use crate::broadcast;
use crate::registry::Registry;
use crate::session::{ConnectionId, Session};
use log::info;

/// Removes the session for `connection_id` and tells everyone left behind.
///
/// Safe to call any number of times for the same connection: only the call
/// that actually removed a session broadcasts, and only that call returns it.
pub fn on_disconnect(registry: &mut Registry, connection_id: ConnectionId) -> Option<Session> {
    let session = registry.remove(connection_id)?;

    info!(
        "Player disconnected: {} (identity {}, connection {})",
        session.display_name, session.identity_id, connection_id
    );
    broadcast::broadcast_leave(registry, connection_id, session.identity_id);

    Some(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ConnectionHandle, Vitals};
    use shared::{IdentityId, Packet, Position};
    use tokio::sync::mpsc;

    fn join(
        registry: &mut Registry,
        connection_id: ConnectionId,
        identity_id: IdentityId,
    ) -> mpsc::UnboundedReceiver<Packet> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry
            .insert(Session::new(
                connection_id,
                identity_id,
                "p".to_string(),
                Position::default(),
                Vitals::new(1, 100, 100),
                ConnectionHandle::new(tx),
            ))
            .unwrap();
        rx
    }

    fn count_left(rx: &mut mpsc::UnboundedReceiver<Packet>, identity_id: IdentityId) -> usize {
        let mut count = 0;
        while let Ok(packet) = rx.try_recv() {
            if packet == (Packet::PlayerLeft { identity_id }) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_disconnect_broadcasts_leave_once() {
        let mut registry = Registry::new();
        let mut a = join(&mut registry, 1, 10);
        let mut b = join(&mut registry, 2, 20);
        let mut c = join(&mut registry, 3, 30);

        assert!(on_disconnect(&mut registry, 1).is_some());
        assert!(on_disconnect(&mut registry, 1).is_none());

        assert_eq!(count_left(&mut b, 10), 1);
        assert_eq!(count_left(&mut c, 10), 1);
        assert_eq!(count_left(&mut a, 10), 0);
        assert!(registry.find_by_identity(10).is_none());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_disconnect_of_unknown_connection() {
        let mut registry = Registry::new();
        let mut a = join(&mut registry, 1, 10);

        assert!(on_disconnect(&mut registry, 42).is_none());
        assert!(a.try_recv().is_err());
    }
}
