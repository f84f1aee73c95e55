//! Mints a login token for a user, for local testing with the client bot

use clap::Parser;
use server::auth::issue_token;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// openId of the user the token is for
    #[arg(short, long)]
    open_id: String,

    /// HMAC secret shared with the server
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: String,

    /// Token lifetime in seconds
    #[arg(long, default_value = "604800")]
    ttl_secs: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let token = issue_token(
        args.jwt_secret.as_bytes(),
        &args.open_id,
        Duration::from_secs(args.ttl_secs),
    )?;
    println!("{}", token);

    Ok(())
}
