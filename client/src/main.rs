use clap::Parser;
use client::bot::{self, BotConfig};
use client::network::Client;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Login token, see the server's issue_token tool
    #[arg(short, long, env = "GAME_TOKEN")]
    token: String,

    /// Number of actions before leaving
    #[arg(short, long, default_value = "100")]
    moves: u32,

    /// Milliseconds between actions
    #[arg(long, default_value = "200")]
    move_interval_ms: u64,

    /// Probability of attacking a visible player on each action
    #[arg(short, long, default_value = "0.1", value_parser = bot::parse_chance)]
    attack_chance: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    let mut client = Client::connect(&args.server, &args.token).await?;

    let config = BotConfig {
        moves: args.moves,
        move_interval: Duration::from_millis(args.move_interval_ms),
        attack_chance: args.attack_chance,
        ..BotConfig::default()
    };
    let summary = bot::run(&mut client, config, StdRng::from_entropy()).await?;
    info!(
        "Done: {} moves, {} attacks, {} kills, {} deaths",
        summary.moves_sent, summary.attacks_sent, summary.kills, summary.deaths
    );

    client.disconnect().await?;

    Ok(())
}
