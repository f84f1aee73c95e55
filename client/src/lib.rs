//! # Game Client Library
//!
//! This library provides a headless client for the multiplayer RPG server.
//! It speaks the same framed TCP protocol as a real game client, which makes
//! it useful for load testing a server and for driving end-to-end tests.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Manages all client-server communication:
//! - Token handshake and the `Connected` greeting with stored progress
//! - Sending join, move, attack and leaderboard requests
//! - A background reader so incoming events queue up between polls
//!
//! ### Game Module (`game`)
//! Keeps a local picture of the world assembled purely from server events:
//! who is online, where they stand, their health, and this player's kills
//! and deaths.
//!
//! ### Bot Module (`bot`)
//! A simple player that steps one tile at a time in a random direction and
//! now and then attacks someone it can see.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bot::{self, BotConfig};
//! use client::network::Client;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:8080", "<token>").await?;
//!
//!     let summary = bot::run(&mut client, BotConfig::default(), StdRng::from_entropy()).await?;
//!     println!("{:?}", summary);
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod game;
pub mod network;
