//! Wire protocol shared by the multiplayer server and its clients.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by a
//! bincode-encoded [`Packet`].

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
/// Longest display name on the wire, in bytes
pub const MAX_NAME_BYTES: usize = 32;

pub const DEFAULT_LEVEL: u32 = 1;
pub const DEFAULT_HP: u32 = 100;
pub const DEFAULT_MANA: u32 = 50;
pub const DEFAULT_GOLD: u32 = 100;
pub const SPAWN_X: i32 = 10;
pub const SPAWN_Y: i32 = 10;

/// Persistent user identifier, stable across reconnections.
pub type IdentityId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn spawn() -> Self {
        Self::new(SPAWN_X, SPAWN_Y)
    }
}

/// The part of a player that is safe to show to everyone else.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub identity_id: IdentityId,
    pub name: String,
    pub level: u32,
    pub position: Position,
    pub hp: u32,
    pub max_hp: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GameProgress {
    pub level: u32,
    pub experience: u32,
    pub hp: u32,
    pub max_hp: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub gold: u32,
    pub position: Position,
    pub skill_points: u32,
}

impl Default for GameProgress {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            experience: 0,
            hp: DEFAULT_HP,
            max_hp: DEFAULT_HP,
            mana: DEFAULT_MANA,
            max_mana: DEFAULT_MANA,
            gold: DEFAULT_GOLD,
            position: Position::spawn(),
            skill_points: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player_name: Option<String>,
    pub level: u32,
    pub experience: u32,
    pub gold: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    // Client -> server
    Connect {
        client_version: u32,
        token: String,
    },
    Join {
        position: Position,
        level: u32,
        hp: u32,
        max_hp: u32,
    },
    Move {
        position: Position,
    },
    Attack {
        target_id: String,
        damage: u32,
    },
    Update {
        hp: u32,
        max_hp: u32,
        level: u32,
    },
    PvpAttack {
        target_player_id: IdentityId,
        damage: u32,
    },
    LeaderboardRequest {
        limit: u32,
    },
    Disconnect,

    // Server -> client
    Connected {
        identity_id: IdentityId,
        name: String,
        progress: Option<GameProgress>,
    },
    Disconnected {
        reason: String,
    },
    PlayersList {
        players: Vec<PlayerView>,
    },
    PlayerJoined {
        player: PlayerView,
    },
    PlayerMoved {
        identity_id: IdentityId,
        position: Position,
    },
    PlayerAttacked {
        attacker_id: IdentityId,
        target_id: String,
        damage: u32,
    },
    PlayerUpdated {
        identity_id: IdentityId,
        hp: u32,
        max_hp: u32,
        level: u32,
    },
    PlayerLeft {
        identity_id: IdentityId,
    },
    PvpDamage {
        attacker_id: IdentityId,
        attacker_name: String,
        target_player_id: IdentityId,
        damage: u32,
    },
    PvpDeath {
        victim_id: IdentityId,
        victim_name: String,
        killer_id: IdentityId,
        killer_name: String,
    },
    PvpRejected {
        target_player_id: IdentityId,
        reason: String,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
}

impl Packet {
    /// Short event name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::Connect { .. } => "connect",
            Packet::Join { .. } => "player:join",
            Packet::Move { .. } => "player:move",
            Packet::Attack { .. } => "player:attack",
            Packet::Update { .. } => "player:update",
            Packet::PvpAttack { .. } => "pvp:attack",
            Packet::LeaderboardRequest { .. } => "leaderboard:request",
            Packet::Disconnect => "disconnect",
            Packet::Connected { .. } => "connected",
            Packet::Disconnected { .. } => "disconnected",
            Packet::PlayersList { .. } => "players:list",
            Packet::PlayerJoined { .. } => "player:joined",
            Packet::PlayerMoved { .. } => "player:moved",
            Packet::PlayerAttacked { .. } => "player:attacked",
            Packet::PlayerUpdated { .. } => "player:updated",
            Packet::PlayerLeft { .. } => "player:left",
            Packet::PvpDamage { .. } => "pvp:damage",
            Packet::PvpDeath { .. } => "pvp:death",
            Packet::PvpRejected { .. } => "pvp:rejected",
            Packet::Leaderboard { .. } => "leaderboard",
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed packet: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the {} byte limit", MAX_FRAME_SIZE)]
    TooLarge(usize),
}

/// Serializes a packet into a length-prefixed frame.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, FrameError> {
    let body = bincode::serialize(packet)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(body.len()));
    }

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Reads one frame. Returns `Ok(None)` when the peer closed the stream.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(bincode::deserialize(&body)?))
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
