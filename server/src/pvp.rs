//! Player-versus-player attack resolution
//!
//! Each attack goes through the same stages, all inside one actor step:
//! 1. Eligibility: both players connected, not self, outside safe zones,
//!    attacker off cooldown
//! 2. Damage: computed by the configured [`DamageModel`]
//! 3. Apply: `hp = max(0, hp - damage)` written back into the registry
//! 4. Death: a target at 0 hp respawns in place with full hp
//! 5. Broadcast: damage to the target and to everyone, then death to everyone
//!
//! Because the world actor handles one event at a time, two attacks on the
//! same target are applied one after the other and neither is lost.

use crate::broadcast;
use crate::registry::Registry;
use crate::session::{ConnectionId, Session};
use log::{info, warn};
use shared::{IdentityId, Packet, Position};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Decides how much damage an attack deals
pub trait DamageModel: Send + Sync + fmt::Debug {
    fn damage(&self, attacker: &Session, target: &Session, proposed: u32) -> u32;
}

/// Trusts the damage the attacking client reports
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientReported;

impl DamageModel for ClientReported {
    fn damage(&self, _attacker: &Session, _target: &Session, proposed: u32) -> u32 {
        proposed
    }
}

/// Ignores the client's number and derives damage from levels
///
/// `max(1, floor(attacker.level * 2 * reduction) - target.level)`
#[derive(Debug, Clone, Copy)]
pub struct LevelScaled {
    pub reduction: f32,
}

impl Default for LevelScaled {
    fn default() -> Self {
        Self { reduction: 0.5 }
    }
}

impl DamageModel for LevelScaled {
    fn damage(&self, attacker: &Session, target: &Session, _proposed: u32) -> u32 {
        let base = attacker.level.saturating_mul(2) as f32;
        let reduced = (base * self.reduction).floor() as u32;
        reduced.saturating_sub(target.level).max(1)
    }
}

/// Rectangular area where PvP is off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeZone {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl SafeZone {
    pub fn contains(&self, position: Position) -> bool {
        position.x >= self.x
            && position.x < self.x + self.width
            && position.y >= self.y
            && position.y < self.y + self.height
    }
}

pub fn default_safe_zones() -> Vec<SafeZone> {
    vec![SafeZone {
        name: "Spawn Area".to_string(),
        x: 8,
        y: 8,
        width: 5,
        height: 5,
    }]
}

/// Server-side checks applied before any damage is computed
#[derive(Debug, Clone)]
pub struct EligibilityRules {
    pub safe_zones: Vec<SafeZone>,
    /// Minimum time between two attacks by the same player; zero disables it
    pub attack_cooldown: Duration,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        Self {
            safe_zones: default_safe_zones(),
            attack_cooldown: Duration::ZERO,
        }
    }
}

impl EligibilityRules {
    pub fn permissive() -> Self {
        Self {
            safe_zones: Vec::new(),
            attack_cooldown: Duration::ZERO,
        }
    }

    fn in_safe_zone(&self, position: Position) -> bool {
        self.safe_zones.iter().any(|zone| zone.contains(position))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Ineligible {
    #[error("You cannot attack yourself")]
    SelfTarget,
    #[error("You cannot attack from a safe zone")]
    AttackerInSafeZone,
    #[error("Target is in a safe zone")]
    TargetInSafeZone,
    #[error("You must wait before attacking again")]
    CoolingDown { remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttackOutcome {
    Resolved {
        damage: u32,
        /// Target hp right after the hit, before any respawn
        target_hp: u32,
        killed: bool,
    },
    TargetUnavailable,
    AttackerUnavailable,
    Rejected(Ineligible),
}

impl AttackOutcome {
    /// Message for the attacker when the attack did not go through
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            AttackOutcome::Resolved { .. } => None,
            AttackOutcome::TargetUnavailable => Some("Target player not found".to_string()),
            AttackOutcome::AttackerUnavailable => Some("You have not joined the game".to_string()),
            AttackOutcome::Rejected(reason) => Some(reason.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct PvpEngine {
    damage_model: Box<dyn DamageModel>,
    rules: EligibilityRules,
    last_attack: HashMap<IdentityId, Instant>,
}

impl PvpEngine {
    pub fn new(damage_model: Box<dyn DamageModel>, rules: EligibilityRules) -> Self {
        Self {
            damage_model,
            rules,
            last_attack: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    /// Drops cooldown bookkeeping for a player who left
    pub fn forget(&mut self, identity_id: IdentityId) {
        self.last_attack.remove(&identity_id);
    }

    fn check_eligibility(
        &self,
        attacker: &Session,
        target: &Session,
        now: Instant,
    ) -> Result<(), Ineligible> {
        if attacker.identity_id == target.identity_id {
            return Err(Ineligible::SelfTarget);
        }

        if !self.rules.attack_cooldown.is_zero() {
            if let Some(last) = self.last_attack.get(&attacker.identity_id) {
                let elapsed = now.saturating_duration_since(*last);
                if elapsed < self.rules.attack_cooldown {
                    return Err(Ineligible::CoolingDown {
                        remaining: self.rules.attack_cooldown - elapsed,
                    });
                }
            }
        }

        if self.rules.in_safe_zone(attacker.position) {
            return Err(Ineligible::AttackerInSafeZone);
        }
        if self.rules.in_safe_zone(target.position) {
            return Err(Ineligible::TargetInSafeZone);
        }

        Ok(())
    }

    /// Runs one attack from `attacker` against the player `target_identity`
    pub fn resolve_attack(
        &mut self,
        registry: &mut Registry,
        attacker: ConnectionId,
        target_identity: IdentityId,
        proposed_damage: u32,
        now: Instant,
    ) -> AttackOutcome {
        let (attacker_id, attacker_name, target_connection, damage) = {
            let Some(attacker_session) = registry.get(attacker) else {
                warn!("PvP attack from connection {} without a session", attacker);
                return AttackOutcome::AttackerUnavailable;
            };
            let Some(target_session) = registry.find_by_identity(target_identity) else {
                info!(
                    "PvP attack failed: target player {} not found",
                    target_identity
                );
                return AttackOutcome::TargetUnavailable;
            };

            if let Err(reason) = self.check_eligibility(attacker_session, target_session, now) {
                info!(
                    "PvP attack by {} on {} rejected: {}",
                    attacker_session.display_name, target_session.display_name, reason
                );
                return AttackOutcome::Rejected(reason);
            }

            let damage = self
                .damage_model
                .damage(attacker_session, target_session, proposed_damage);
            (
                attacker_session.identity_id,
                attacker_session.display_name.clone(),
                target_session.connection_id,
                damage,
            )
        };

        self.last_attack.insert(attacker_id, now);

        let mut target_hp = 0;
        let mut victim = None;
        registry.update(target_connection, |target| {
            target.hp = target.hp.saturating_sub(damage);
            target_hp = target.hp;

            info!(
                "PvP: {} attacked {} for {} damage (HP: {}/{})",
                attacker_name, target.display_name, damage, target.hp, target.max_hp
            );

            if target.is_dead() {
                victim = Some((target.identity_id, target.display_name.clone()));
                target.hp = target.max_hp;
            }
        });

        let damage_event = Packet::PvpDamage {
            attacker_id,
            attacker_name: attacker_name.clone(),
            target_player_id: target_identity,
            damage,
        };
        broadcast::send_to(registry, target_connection, damage_event.clone());
        broadcast::broadcast(registry, &damage_event, None);

        let killed = victim.is_some();
        if let Some((victim_id, victim_name)) = victim {
            info!("PvP Death: {} was killed by {}", victim_name, attacker_name);
            broadcast::broadcast(
                registry,
                &Packet::PvpDeath {
                    victim_id,
                    victim_name,
                    killer_id: attacker_id,
                    killer_name: attacker_name,
                },
                None,
            );
        }

        AttackOutcome::Resolved {
            damage,
            target_hp,
            killed,
        }
    }
}

impl Default for PvpEngine {
    fn default() -> Self {
        Self::new(Box::new(ClientReported), EligibilityRules::default())
    }
}
