use clap::Parser;
use log::{error, info, warn};
use server::auth::{Authenticator, MemoryIdentityStore};
use server::config::{DamageModelKind, ServerConfig};
use server::network::Server;
use server::pvp::EligibilityRules;
use server::sync::{JsonFileStore, SyncGateway};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected players (at most 1000)
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Time a new connection has to authenticate
    #[arg(long, default_value = "10000")]
    handshake_timeout_ms: u64,

    /// Seconds between progress saves
    #[arg(long, default_value = "30")]
    flush_interval_secs: u64,

    /// HMAC secret for verifying tokens
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: String,

    /// JSON file listing known users
    #[arg(short, long)]
    users: PathBuf,

    /// JSON file for player progress (kept in memory when omitted)
    #[arg(long)]
    progress: Option<PathBuf>,

    /// How PvP damage is computed
    #[arg(long, value_enum, default_value = "client")]
    damage_model: DamageModelKind,

    /// Minimum time between two PvP attacks by the same player
    #[arg(long, default_value = "0")]
    pvp_cooldown_ms: u64,

    /// Allow PvP inside safe zones
    #[arg(long)]
    no_safe_zones: bool,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let mut pvp_rules = EligibilityRules::default();
        pvp_rules.attack_cooldown = Duration::from_millis(self.pvp_cooldown_ms);
        if self.no_safe_zones {
            pvp_rules.safe_zones.clear();
        }

        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            max_clients: self.max_clients,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            damage_model: self.damage_model,
            pvp_rules,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let users = MemoryIdentityStore::from_json_file(&args.users)?;
    if users.is_empty() {
        warn!("No users in {}, every connection will be refused", args.users.display());
    }
    info!("Loaded {} users from {}", users.len(), args.users.display());
    let authenticator = Arc::new(Authenticator::new(args.jwt_secret.as_bytes(), Arc::new(users)));

    let gateway = match &args.progress {
        Some(path) => {
            info!("Persisting progress to {}", path.display());
            SyncGateway::new(Arc::new(JsonFileStore::open(path)?))
        }
        None => {
            warn!("No progress file given, progress is lost on exit");
            SyncGateway::in_memory()
        }
    };

    let config = args.config();
    info!(
        "Max clients: {}, damage model: {:?}, PvP cooldown: {:?}",
        config.max_clients, config.damage_model, config.pvp_rules.attack_cooldown
    );

    let mut server = Server::new(config, authenticator, Arc::new(gateway)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.shutdown(),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
