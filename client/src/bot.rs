//! Headless player that wanders and picks fights at random

use crate::game::WorldView;
use crate::network::{Client, ClientError};
use log::info;
use rand::Rng;
use shared::{Packet, Position};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Number of actions before leaving
    pub moves: u32,
    pub move_interval: Duration,
    /// Probability of attacking a visible player instead of moving
    pub attack_chance: f64,
    pub min_damage: u32,
    pub max_damage: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            moves: 100,
            move_interval: Duration::from_millis(200),
            attack_chance: 0.1,
            min_damage: 5,
            max_damage: 20,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BotSummary {
    pub moves_sent: u32,
    pub attacks_sent: u32,
    pub kills: u32,
    pub deaths: u32,
}

pub struct Bot<R: Rng> {
    rng: R,
    position: Position,
    config: BotConfig,
}

impl<R: Rng> Bot<R> {
    pub fn new(start: Position, config: BotConfig, rng: R) -> Self {
        Self {
            rng,
            position: start,
            config,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Attack chance as a valid probability; NaN and infinities count as 0
    fn attack_probability(&self) -> f64 {
        let chance = self.config.attack_chance;
        if chance.is_finite() {
            chance.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Picks the next packet: an attack on someone in view, or a one-tile step
    pub fn next_action(&mut self, world: &WorldView) -> Packet {
        let others = world.others();
        if !others.is_empty() && self.rng.gen_bool(self.attack_probability()) {
            let target = others[self.rng.gen_range(0..others.len())];
            let low = self.config.min_damage.min(self.config.max_damage);
            return Packet::PvpAttack {
                target_player_id: target.identity_id,
                damage: self.rng.gen_range(low..=self.config.max_damage),
            };
        }

        self.position = Position::new(
            self.position.x.saturating_add(self.rng.gen_range(-1..=1)),
            self.position.y.saturating_add(self.rng.gen_range(-1..=1)),
        );
        Packet::Move {
            position: self.position,
        }
    }
}

/// Parses an attack chance for the command line, accepting 0 to 1 only
pub fn parse_chance(value: &str) -> Result<f64, String> {
    let chance: f64 = value
        .parse()
        .map_err(|_| format!("`{}` is not a number", value))?;
    if !(0.0..=1.0).contains(&chance) {
        return Err(format!("{} is not between 0 and 1", chance));
    }
    Ok(chance)
}

/// Joins the world, acts `config.moves` times and leaves
pub async fn run<R: Rng>(
    client: &mut Client,
    config: BotConfig,
    rng: R,
) -> Result<BotSummary, ClientError> {
    let start = client.progress().cloned().unwrap_or_default().position;
    let interval = config.move_interval;
    let moves = config.moves;
    let mut bot = Bot::new(start, config, rng);
    let mut world = WorldView::new(client.identity_id());
    let mut summary = BotSummary::default();

    client.join().await?;
    info!("{} joined at ({}, {})", client.name(), start.x, start.y);

    for _ in 0..moves {
        while let Some(packet) = client.try_recv() {
            if !world.apply(&packet) {
                return Err(ClientError::Refused(
                    world.disconnect_reason.clone().unwrap_or_default(),
                ));
            }
        }

        let action = bot.next_action(&world);
        match action {
            Packet::PvpAttack { .. } => summary.attacks_sent += 1,
            _ => summary.moves_sent += 1,
        }
        client.send(&action).await?;

        sleep(interval).await;
    }

    summary.kills = world.kills;
    summary.deaths = world.deaths;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::PlayerView;

    fn world_with_target() -> WorldView {
        let mut world = WorldView::new(1);
        world.apply(&Packet::PlayerJoined {
            player: PlayerView {
                identity_id: 2,
                name: "p2".to_string(),
                level: 1,
                position: Position::new(0, 0),
                hp: 100,
                max_hp: 100,
            },
        });
        world
    }

    fn bot(attack_chance: f64) -> Bot<StdRng> {
        Bot::new(
            Position::new(10, 10),
            BotConfig {
                attack_chance,
                ..BotConfig::default()
            },
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_peaceful_bot_only_steps() {
        let mut bot = bot(0.0);
        let world = world_with_target();

        for _ in 0..50 {
            let before = bot.position();
            match bot.next_action(&world) {
                Packet::Move { position } => {
                    assert!((position.x - before.x).abs() <= 1);
                    assert!((position.y - before.y).abs() <= 1);
                    assert_eq!(position, bot.position());
                }
                other => panic!("Unexpected action: {:?}", other),
            }
        }
    }

    #[test]
    fn test_aggressive_bot_attacks_visible_player() {
        let mut bot = bot(1.0);

        match bot.next_action(&world_with_target()) {
            Packet::PvpAttack {
                target_player_id,
                damage,
            } => {
                assert_eq!(target_player_id, 2);
                assert!((5..=20).contains(&damage));
            }
            other => panic!("Unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_chance_never_attacks() {
        for chance in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut bot = bot(chance);
            assert!(matches!(
                bot.next_action(&world_with_target()),
                Packet::Move { .. }
            ));
        }
    }

    #[test]
    fn test_steps_saturate_at_world_edge() {
        let mut bot = Bot::new(
            Position::new(i32::MAX, i32::MIN),
            BotConfig {
                attack_chance: 0.0,
                ..BotConfig::default()
            },
            StdRng::seed_from_u64(3),
        );

        for _ in 0..50 {
            bot.next_action(&WorldView::new(1));
        }
        assert!(bot.position().x >= i32::MAX - 50);
        assert!(bot.position().y <= i32::MIN + 50);
    }

    #[test]
    fn test_parse_chance() {
        assert_eq!(parse_chance("0.25"), Ok(0.25));
        assert_eq!(parse_chance("1"), Ok(1.0));
        assert!(parse_chance("NaN").is_err());
        assert!(parse_chance("inf").is_err());
        assert!(parse_chance("1.5").is_err());
        assert!(parse_chance("-0.1").is_err());
        assert!(parse_chance("often").is_err());
    }

    #[test]
    fn test_aggressive_bot_alone_still_moves() {
        let mut bot = bot(1.0);
        assert!(matches!(
            bot.next_action(&WorldView::new(1)),
            Packet::Move { .. }
        ));
    }
}
