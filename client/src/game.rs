use log::{debug, info};
use shared::{IdentityId, LeaderboardEntry, Packet, PlayerView};
use std::collections::HashMap;

/// What this client knows about the world, built only from server events
#[derive(Debug, Clone)]
pub struct WorldView {
    pub me: IdentityId,
    /// Every other joined player
    pub players: HashMap<IdentityId, PlayerView>,
    pub kills: u32,
    pub deaths: u32,
    pub last_rejection: Option<String>,
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Set once the server says goodbye
    pub disconnect_reason: Option<String>,
}

impl WorldView {
    pub fn new(me: IdentityId) -> Self {
        Self {
            me,
            players: HashMap::new(),
            kills: 0,
            deaths: 0,
            last_rejection: None,
            leaderboard: Vec::new(),
            disconnect_reason: None,
        }
    }

    /// Folds one server event into the view. Returns false once the server
    /// has closed the session.
    pub fn apply(&mut self, packet: &Packet) -> bool {
        match packet {
            Packet::PlayersList { players } => {
                self.players = players
                    .iter()
                    .filter(|p| p.identity_id != self.me)
                    .map(|p| (p.identity_id, p.clone()))
                    .collect();
            }

            Packet::PlayerJoined { player } => {
                if player.identity_id != self.me {
                    self.players.insert(player.identity_id, player.clone());
                }
            }

            Packet::PlayerMoved {
                identity_id,
                position,
            } => {
                if let Some(player) = self.players.get_mut(identity_id) {
                    player.position = *position;
                }
            }

            Packet::PlayerUpdated {
                identity_id,
                hp,
                max_hp,
                level,
            } => {
                if let Some(player) = self.players.get_mut(identity_id) {
                    player.hp = *hp;
                    player.max_hp = *max_hp;
                    player.level = *level;
                }
            }

            Packet::PlayerLeft { identity_id } => {
                self.players.remove(identity_id);
            }

            Packet::PlayerAttacked {
                attacker_id,
                target_id,
                damage,
            } => {
                debug!("{} hit {} for {}", attacker_id, target_id, damage);
            }

            // The target gets this twice; the broadcast copy is the one that
            // also reaches everyone else, so only others' hp is tracked here
            Packet::PvpDamage {
                target_player_id,
                damage,
                ..
            } => {
                if let Some(player) = self.players.get_mut(target_player_id) {
                    player.hp = player.hp.saturating_sub(*damage);
                }
            }

            Packet::PvpDeath {
                victim_id,
                victim_name,
                killer_id,
                killer_name,
            } => {
                info!("{} was killed by {}", victim_name, killer_name);
                if *victim_id == self.me {
                    self.deaths += 1;
                }
                if *killer_id == self.me {
                    self.kills += 1;
                }
                if let Some(victim) = self.players.get_mut(victim_id) {
                    victim.hp = victim.max_hp;
                }
            }

            Packet::PvpRejected { reason, .. } => {
                debug!("Attack rejected: {}", reason);
                self.last_rejection = Some(reason.clone());
            }

            Packet::Leaderboard { entries } => {
                self.leaderboard = entries.clone();
            }

            Packet::Disconnected { reason } => {
                info!("Server closed the session: {}", reason);
                self.disconnect_reason = Some(reason.clone());
                return false;
            }

            other => debug!("Ignoring {}", other.name()),
        }

        true
    }

    /// Other players sorted by id
    pub fn others(&self) -> Vec<&PlayerView> {
        let mut others: Vec<&PlayerView> = self.players.values().collect();
        others.sort_by_key(|p| p.identity_id);
        others
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Position;

    fn view(identity_id: IdentityId, hp: u32) -> PlayerView {
        PlayerView {
            identity_id,
            name: format!("p{}", identity_id),
            level: 1,
            position: Position::new(0, 0),
            hp,
            max_hp: 100,
        }
    }

    #[test]
    fn test_snapshot_then_presence_events() {
        let mut world = WorldView::new(1);

        assert!(world.apply(&Packet::PlayersList {
            players: vec![view(2, 100), view(3, 100)],
        }));
        world.apply(&Packet::PlayerJoined {
            player: view(4, 100),
        });
        world.apply(&Packet::PlayerMoved {
            identity_id: 2,
            position: Position::new(9, 9),
        });
        world.apply(&Packet::PlayerLeft { identity_id: 3 });

        let ids: Vec<IdentityId> = world.others().iter().map(|p| p.identity_id).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(world.players[&2].position, Position::new(9, 9));
    }

    #[test]
    fn test_pvp_damage_and_death() {
        let mut world = WorldView::new(1);
        world.apply(&Packet::PlayersList {
            players: vec![view(2, 100)],
        });

        world.apply(&Packet::PvpDamage {
            attacker_id: 1,
            attacker_name: "p1".to_string(),
            target_player_id: 2,
            damage: 30,
        });
        assert_eq!(world.players[&2].hp, 70);

        world.apply(&Packet::PvpDeath {
            victim_id: 2,
            victim_name: "p2".to_string(),
            killer_id: 1,
            killer_name: "p1".to_string(),
        });
        assert_eq!(world.players[&2].hp, 100);
        assert_eq!(world.kills, 1);
        assert_eq!(world.deaths, 0);
    }

    #[test]
    fn test_updates_for_unknown_players_are_ignored() {
        let mut world = WorldView::new(1);
        world.apply(&Packet::PlayerUpdated {
            identity_id: 8,
            hp: 1,
            max_hp: 1,
            level: 1,
        });
        assert!(world.players.is_empty());
    }

    #[test]
    fn test_disconnect_stops_the_view() {
        let mut world = WorldView::new(1);
        assert!(!world.apply(&Packet::Disconnected {
            reason: "Server full".to_string(),
        }));
        assert_eq!(world.disconnect_reason.as_deref(), Some("Server full"));
    }
}
