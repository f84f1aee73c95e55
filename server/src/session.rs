//! Per-connection player state held by the registry
//!
//! A session exists from the moment an authenticated connection sends its
//! join payload until that connection goes away. Nothing about a session
//! survives a disconnect; persisted progress lives in the sync gateway.

use shared::{IdentityId, Packet, PlayerView, Position};
use tokio::sync::mpsc;

/// Server-assigned connection identifier, unique for the life of the process
pub type ConnectionId = u64;

/// Address of one connection's outbound queue
///
/// The writer task on the other end of the channel owns the socket, so
/// sending never blocks the caller. Dropping every clone of the handle
/// closes the connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<Packet>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<Packet>) -> Self {
        Self { sender }
    }

    /// Queues a packet for this connection. Returns false once the
    /// connection's writer has gone away.
    pub fn send(&self, packet: Packet) -> bool {
        self.sender.send(packet).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Level, hp and max hp as accepted from a client
///
/// Construction enforces `level >= 1` and `hp <= max_hp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vitals {
    pub level: u32,
    pub hp: u32,
    pub max_hp: u32,
}

impl Vitals {
    pub fn new(level: u32, hp: u32, max_hp: u32) -> Self {
        Self {
            level: level.max(1),
            hp: hp.min(max_hp),
            max_hp,
        }
    }
}

/// A connected player
#[derive(Debug, Clone)]
pub struct Session {
    /// Connection this session belongs to
    pub connection_id: ConnectionId,
    /// Authenticated identity, fixed at creation
    pub identity_id: IdentityId,
    /// Name shown to other players
    pub display_name: String,
    pub level: u32,
    pub position: Position,
    pub hp: u32,
    pub max_hp: u32,
    /// Outbound queue for this connection only
    pub handle: ConnectionHandle,
}

impl Session {
    pub fn new(
        connection_id: ConnectionId,
        identity_id: IdentityId,
        display_name: String,
        position: Position,
        vitals: Vitals,
        handle: ConnectionHandle,
    ) -> Self {
        Self {
            connection_id,
            identity_id,
            display_name,
            level: vitals.level,
            position,
            hp: vitals.hp,
            max_hp: vitals.max_hp,
            handle,
        }
    }

    pub fn set_vitals(&mut self, vitals: Vitals) {
        self.level = vitals.level;
        self.hp = vitals.hp;
        self.max_hp = vitals.max_hp;
    }

    pub fn is_dead(&self) -> bool {
        self.hp == 0
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            identity_id: self.identity_id,
            name: self.display_name.clone(),
            level: self.level,
            position: self.position,
            hp: self.hp,
            max_hp: self.max_hp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vitals_clamp_hp_to_max() {
        let vitals = Vitals::new(3, 150, 100);
        assert_eq!(vitals.hp, 100);
        assert_eq!(vitals.max_hp, 100);
        assert_eq!(vitals.level, 3);
    }

    #[test]
    fn test_vitals_level_at_least_one() {
        assert_eq!(Vitals::new(0, 10, 10).level, 1);
    }

    #[test]
    fn test_view_has_public_fields() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(
            4,
            42,
            "alice".to_string(),
            Position::new(1, 2),
            Vitals::new(5, 80, 100),
            ConnectionHandle::new(tx),
        );

        let view = session.view();
        assert_eq!(view.identity_id, 42);
        assert_eq!(view.name, "alice");
        assert_eq!(view.level, 5);
        assert_eq!(view.position, Position::new(1, 2));
        assert_eq!(view.hp, 80);
        assert_eq!(view.max_hp, 100);
    }

    #[test]
    fn test_handle_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(tx);

        assert!(handle.send(Packet::Disconnect));
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(Packet::Disconnect));
    }
}
