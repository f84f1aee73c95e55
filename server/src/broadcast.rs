//! Presence fan-out over the registry
//!
//! Every function here reads the registry and queues packets on session
//! handles. None of them mutate state, so callers run them right after the
//! mutation they announce, inside the same actor step.

use crate::registry::Registry;
use crate::session::{ConnectionId, Session};
use log::debug;
use shared::{IdentityId, Packet, Position};

/// Sends `packet` to every session, skipping `exclude` if given
///
/// Returns how many sessions the packet was queued for.
pub fn broadcast(registry: &Registry, packet: &Packet, exclude: Option<ConnectionId>) -> usize {
    let mut delivered = 0;
    for session in registry.iter() {
        if Some(session.connection_id) == exclude {
            continue;
        }

        if session.handle.send(packet.clone()) {
            delivered += 1;
        } else {
            debug!(
                "Dropping {} for closed connection {}",
                packet.name(),
                session.connection_id
            );
        }
    }
    delivered
}

/// Sends `packet` to one session only
pub fn send_to(registry: &Registry, connection_id: ConnectionId, packet: Packet) -> bool {
    registry
        .get(connection_id)
        .map(|session| session.handle.send(packet))
        .unwrap_or(false)
}

/// Delivers the list of every other live session to a newly joined one
pub fn send_snapshot_to(registry: &Registry, connection_id: ConnectionId) -> bool {
    let players = registry
        .list_all_except(connection_id)
        .into_iter()
        .map(Session::view)
        .collect();

    send_to(registry, connection_id, Packet::PlayersList { players })
}

pub fn broadcast_join(registry: &Registry, session: &Session) -> usize {
    broadcast(
        registry,
        &Packet::PlayerJoined {
            player: session.view(),
        },
        Some(session.connection_id),
    )
}

pub fn broadcast_move(registry: &Registry, connection_id: ConnectionId, position: Position) -> usize {
    let Some(session) = registry.get(connection_id) else {
        return 0;
    };

    broadcast(
        registry,
        &Packet::PlayerMoved {
            identity_id: session.identity_id,
            position,
        },
        Some(connection_id),
    )
}

pub fn broadcast_stat_update(
    registry: &Registry,
    connection_id: ConnectionId,
    hp: u32,
    max_hp: u32,
    level: u32,
) -> usize {
    let Some(session) = registry.get(connection_id) else {
        return 0;
    };

    broadcast(
        registry,
        &Packet::PlayerUpdated {
            identity_id: session.identity_id,
            hp,
            max_hp,
            level,
        },
        Some(connection_id),
    )
}

/// Announces a departure. The leaving session has normally been removed
/// already; it is excluded either way.
pub fn broadcast_leave(
    registry: &Registry,
    connection_id: ConnectionId,
    identity_id: IdentityId,
) -> usize {
    broadcast(
        registry,
        &Packet::PlayerLeft { identity_id },
        Some(connection_id),
    )
}
