//! # Game Server Library
//!
//! This library provides the authoritative real-time core of the multiplayer
//! RPG server. It authenticates connections, keeps the set of live player
//! sessions, relays presence (join, move, stat and leave events) between
//! players, and resolves player-versus-player combat.
//!
//! ## Core Responsibilities
//!
//! ### Session Management
//! Handles the complete lifecycle of a player connection:
//! - Token authentication before the connection is admitted
//! - Session creation from the player's join payload
//! - In-place updates on move, stat and combat events
//! - Cleanup and a leave announcement on disconnect
//!
//! ### Presence Broadcasting
//! A joining player receives a snapshot of everyone already online, and
//! everyone else learns about the newcomer. Moves and stat changes go to
//! every other player, never back to the originator.
//!
//! ### PvP Resolution
//! Attacks between players are checked, applied and announced in a single
//! step. A killed player respawns in place at full health.
//!
//! ### Progress Persistence
//! Stored progress is handed to a client when it connects and the
//! session-owned fields are written back periodically, on disconnect and on
//! shutdown.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Event Loop
//! All session state lives in the [`world::World`], owned by one task. Every
//! connection event is a message on one channel and is applied to completion
//! before the next is looked at, so no lock guards the registry and no two
//! updates to the same player can interleave.
//!
//! ### TCP-Based Communication
//! Each connection is a TCP stream of length-prefixed frames. A reader task
//! forwards decoded packets to the world loop, and a writer task drains a
//! per-connection queue so a slow client never stalls anyone else.
//!
//! ## Module Organization
//!
//! - `auth`: JWT verification and the identity store
//! - `broadcast`: presence fan-out over the registry
//! - `config`: server settings
//! - `lifecycle`: disconnect cleanup
//! - `network`: TCP listener, connection tasks and the main loop
//! - `pvp`: attack eligibility, damage and death
//! - `registry`: live sessions by connection
//! - `session`: per-player state and outbound handle
//! - `sync`: progress store boundary and leaderboard
//! - `world`: the state the main loop owns and its event dispatch
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::auth::{Authenticator, MemoryIdentityStore};
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::sync::SyncGateway;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let users = MemoryIdentityStore::from_json_file("users.json")?;
//!     let authenticator = Arc::new(Authenticator::new(b"secret", Arc::new(users)));
//!     let gateway = Arc::new(SyncGateway::in_memory());
//!
//!     // Listens on 127.0.0.1:8080, saves progress every 30 seconds
//!     let mut server = Server::new(ServerConfig::default(), authenticator, gateway).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod lifecycle;
pub mod network;
pub mod pvp;
pub mod registry;
pub mod session;
pub mod sync;
pub mod utils;
pub mod world;
