//! Server settings, filled from the command line in `main`

use crate::pvp::{ClientReported, DamageModel, EligibilityRules, LevelScaled, PvpEngine};
use clap::ValueEnum;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CLIENTS: usize = 64;
/// Most connections a server admits; a join snapshot of this many players
/// with maximum-length names still fits one frame
pub const MAX_CLIENTS_LIMIT: usize = 1000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DamageModelKind {
    /// Use the damage the attacker's client reports
    Client,
    /// Compute damage from attacker and target levels
    Level,
}

impl DamageModelKind {
    pub fn build(self) -> Box<dyn DamageModel> {
        match self {
            DamageModelKind::Client => Box::new(ClientReported),
            DamageModelKind::Level => Box::new(LevelScaled::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_clients: usize,
    /// Time a new connection has to present a valid token
    pub handshake_timeout: Duration,
    /// Period of the progress save for all live sessions
    pub flush_interval: Duration,
    pub damage_model: DamageModelKind,
    pub pvp_rules: EligibilityRules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            damage_model: DamageModelKind::Client,
            pvp_rules: EligibilityRules::default(),
        }
    }
}

impl ServerConfig {
    pub fn pvp_engine(&self) -> PvpEngine {
        PvpEngine::new(self.damage_model.build(), self.pvp_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.damage_model, DamageModelKind::Client);
        assert_eq!(config.pvp_rules.safe_zones.len(), 1);
        assert!(config.pvp_rules.attack_cooldown.is_zero());
    }

    #[test]
    fn test_engine_uses_configured_rules() {
        let config = ServerConfig {
            pvp_rules: EligibilityRules::permissive(),
            ..ServerConfig::default()
        };
        assert!(config.pvp_engine().rules().safe_zones.is_empty());
    }
}
