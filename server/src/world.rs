//! Authoritative world state and event dispatch
//!
//! The world owns the registry, the connections that have authenticated but
//! not yet joined, and the PvP engine. The server loop feeds it one event at
//! a time; whatever needs the progress store afterwards comes back as a
//! [`Followup`] so no store I/O ever runs inside a world step.

use crate::auth::Identity;
use crate::broadcast;
use crate::config::{ServerConfig, MAX_CLIENTS_LIMIT};
use crate::lifecycle;
use crate::pvp::PvpEngine;
use crate::registry::Registry;
use crate::session::{ConnectionHandle, ConnectionId, Session, Vitals};
use crate::sync::SessionProgress;
use crate::utils::leaderboard_limit;
use log::{debug, error, info, warn};
use shared::{GameProgress, Packet};
use std::collections::HashMap;
use std::time::Instant;

pub const SERVER_FULL: &str = "Server full";
pub const REPLACED_BY_NEW_LOGIN: &str = "Logged in from another location";

/// Authenticated connection still waiting for its join payload
#[derive(Debug)]
struct PendingConnection {
    identity: Identity,
    handle: ConnectionHandle,
}

/// Work left for the server loop after a world step
#[derive(Debug)]
pub enum Followup {
    None,
    /// A session ended; its progress should be saved
    Departed(SessionProgress),
    /// The connection asked for the top `limit` players
    Leaderboard {
        handle: ConnectionHandle,
        limit: usize,
    },
}

#[derive(Debug)]
pub struct Admission {
    pub accepted: bool,
    /// Session of the same identity that this login pushed out
    pub evicted: Option<SessionProgress>,
}

#[derive(Debug)]
pub struct World {
    registry: Registry,
    pending: HashMap<ConnectionId, PendingConnection>,
    pvp: PvpEngine,
    max_clients: usize,
}

impl World {
    pub fn new(pvp: PvpEngine, max_clients: usize) -> Self {
        if max_clients > MAX_CLIENTS_LIMIT {
            warn!(
                "max_clients {} lowered to {} so a join snapshot fits one frame",
                max_clients, MAX_CLIENTS_LIMIT
            );
        }

        Self {
            registry: Registry::new(),
            pending: HashMap::new(),
            pvp,
            max_clients: max_clients.min(MAX_CLIENTS_LIMIT),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.pvp_engine(), config.max_clients)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of joined players
    pub fn online_count(&self) -> usize {
        self.registry.len()
    }

    fn connection_count(&self) -> usize {
        self.registry.len() + self.pending.len()
    }

    fn handle_of(&self, connection_id: ConnectionId) -> Option<&ConnectionHandle> {
        self.registry
            .get(connection_id)
            .map(|session| &session.handle)
            .or_else(|| self.pending.get(&connection_id).map(|p| &p.handle))
    }

    /// Takes in a freshly authenticated connection
    ///
    /// An older connection of the same identity is told why and dropped
    /// first, so a reconnecting player never counts twice against
    /// `max_clients`. The evicted session's progress comes back so the
    /// caller can save it before loading progress for the new connection.
    pub fn admit(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        handle: ConnectionHandle,
    ) -> Admission {
        let evicted = self.evict_identity(&identity);

        if self.connection_count() >= self.max_clients {
            warn!(
                "Refusing {} on connection {}: server full",
                identity.display_name, connection_id
            );
            handle.send(Packet::Disconnected {
                reason: SERVER_FULL.to_string(),
            });
            return Admission {
                accepted: false,
                evicted,
            };
        }

        info!(
            "Connection {} authenticated as {} (identity {})",
            connection_id, identity.display_name, identity.identity_id
        );
        self.pending
            .insert(connection_id, PendingConnection { identity, handle });

        Admission {
            accepted: true,
            evicted,
        }
    }

    /// Greets an admitted connection with its identity and stored progress.
    /// Returns false if the connection is no longer waiting to join.
    pub fn greet(&self, connection_id: ConnectionId, progress: Option<GameProgress>) -> bool {
        let Some(pending) = self.pending.get(&connection_id) else {
            debug!("Connection {} gone before its greeting", connection_id);
            return false;
        };

        pending.handle.send(Packet::Connected {
            identity_id: pending.identity.identity_id,
            name: pending.identity.display_name.clone(),
            progress,
        })
    }

    fn evict_identity(&mut self, identity: &Identity) -> Option<SessionProgress> {
        let stale_pending: Vec<ConnectionId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.identity.identity_id == identity.identity_id)
            .map(|(id, _)| *id)
            .collect();
        for connection_id in stale_pending {
            if let Some(pending) = self.pending.remove(&connection_id) {
                pending.handle.send(Packet::Disconnected {
                    reason: REPLACED_BY_NEW_LOGIN.to_string(),
                });
            }
        }

        let connection_id = self
            .registry
            .find_by_identity(identity.identity_id)?
            .connection_id;
        info!(
            "{} logged in again, closing connection {}",
            identity.display_name, connection_id
        );
        broadcast::send_to(
            &self.registry,
            connection_id,
            Packet::Disconnected {
                reason: REPLACED_BY_NEW_LOGIN.to_string(),
            },
        );
        self.disconnect(connection_id)
    }

    /// Applies one client packet
    pub fn handle_packet(
        &mut self,
        connection_id: ConnectionId,
        packet: Packet,
        now: Instant,
    ) -> Followup {
        match packet {
            Packet::Join {
                position,
                level,
                hp,
                max_hp,
            } => {
                if self.registry.contains(connection_id) {
                    error!(
                        "Invariant violation: connection {} sent join twice",
                        connection_id
                    );
                    return Followup::None;
                }
                let Some(pending) = self.pending.remove(&connection_id) else {
                    warn!("Join from unauthenticated connection {}", connection_id);
                    return Followup::None;
                };

                let session = Session::new(
                    connection_id,
                    pending.identity.identity_id,
                    pending.identity.display_name,
                    position,
                    Vitals::new(level, hp, max_hp),
                    pending.handle,
                );
                let view = session.clone();
                if let Err(e) = self.registry.insert(session) {
                    error!("Invariant violation: {}", e);
                    return Followup::None;
                }

                info!(
                    "Player joined: {} at ({}, {})",
                    view.display_name, position.x, position.y
                );
                broadcast::send_snapshot_to(&self.registry, connection_id);
                broadcast::broadcast_join(&self.registry, &view);
            }

            Packet::Move { position } => {
                if self
                    .registry
                    .update(connection_id, |session| session.position = position)
                {
                    broadcast::broadcast_move(&self.registry, connection_id, position);
                } else {
                    debug!("Move from connection {} before join", connection_id);
                }
            }

            Packet::Update { hp, max_hp, level } => {
                let vitals = Vitals::new(level, hp, max_hp);
                if self
                    .registry
                    .update(connection_id, |session| session.set_vitals(vitals))
                {
                    broadcast::broadcast_stat_update(
                        &self.registry,
                        connection_id,
                        vitals.hp,
                        vitals.max_hp,
                        vitals.level,
                    );
                } else {
                    debug!("Update from connection {} before join", connection_id);
                }
            }

            Packet::Attack { target_id, damage } => {
                let Some(attacker) = self.registry.get(connection_id) else {
                    debug!("Attack from connection {} before join", connection_id);
                    return Followup::None;
                };

                // Everyone sees the hit, the attacker included
                let relay = Packet::PlayerAttacked {
                    attacker_id: attacker.identity_id,
                    target_id,
                    damage,
                };
                broadcast::broadcast(&self.registry, &relay, None);
            }

            Packet::PvpAttack {
                target_player_id,
                damage,
            } => {
                let outcome = self.pvp.resolve_attack(
                    &mut self.registry,
                    connection_id,
                    target_player_id,
                    damage,
                    now,
                );
                if let Some(reason) = outcome.rejection_reason() {
                    if let Some(handle) = self.handle_of(connection_id) {
                        handle.send(Packet::PvpRejected {
                            target_player_id,
                            reason,
                        });
                    }
                }
            }

            Packet::LeaderboardRequest { limit } => {
                if let Some(handle) = self.handle_of(connection_id) {
                    return Followup::Leaderboard {
                        handle: handle.clone(),
                        limit: leaderboard_limit(limit),
                    };
                }
            }

            Packet::Disconnect => {
                if let Some(progress) = self.disconnect(connection_id) {
                    return Followup::Departed(progress);
                }
            }

            other => {
                warn!(
                    "Unexpected packet type {} from connection {}",
                    other.name(),
                    connection_id
                );
            }
        }

        Followup::None
    }

    /// Forgets everything about `connection_id`. Only the first call for a
    /// joined connection returns its progress.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Option<SessionProgress> {
        if self.pending.remove(&connection_id).is_some() {
            debug!("Connection {} left before joining", connection_id);
        }

        let session = lifecycle::on_disconnect(&mut self.registry, connection_id)?;
        self.pvp.forget(session.identity_id);
        Some(SessionProgress::from(&session))
    }

    /// Progress of every joined player, for the periodic save
    pub fn progress_batch(&self) -> Vec<SessionProgress> {
        self.registry.iter().map(SessionProgress::from).collect()
    }

    /// Tells every connection the server is going away and drops them all.
    /// Returns the progress of every player that was joined.
    pub fn shutdown(&mut self, reason: &str) -> Vec<SessionProgress> {
        let goodbye = Packet::Disconnected {
            reason: reason.to_string(),
        };
        for pending in self.pending.values() {
            pending.handle.send(goodbye.clone());
        }
        self.pending.clear();

        broadcast::broadcast(&self.registry, &goodbye, None);
        let batch = self.progress_batch();
        let connections: Vec<ConnectionId> =
            self.registry.iter().map(|s| s.connection_id).collect();
        for connection_id in connections {
            self.registry.remove(connection_id);
        }
        batch
    }
}
