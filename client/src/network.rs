//! Client side of the TCP protocol

use log::{debug, info, warn};
use shared::{
    read_packet, write_packet, FrameError, GameProgress, IdentityId, Packet, Position,
    PROTOCOL_VERSION,
};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("server refused the connection: {0}")]
    Refused(String),
    #[error("server closed the connection")]
    Closed,
    #[error("unexpected {0} during handshake")]
    UnexpectedPacket(&'static str),
}

/// An authenticated connection to the game server
///
/// Incoming packets are read by a background task and queued, so `recv`
/// can be raced against timers without losing half a frame.
pub struct Client {
    writer: OwnedWriteHalf,
    incoming: mpsc::UnboundedReceiver<Packet>,
    identity_id: IdentityId,
    name: String,
    progress: Option<GameProgress>,
}

impl Client {
    /// Connects to `server_addr` and authenticates with `token`
    pub async fn connect(server_addr: &str, token: &str) -> Result<Self, ClientError> {
        info!("Connecting to server at {}...", server_addr);

        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        write_packet(
            &mut writer,
            &Packet::Connect {
                client_version: PROTOCOL_VERSION,
                token: token.to_string(),
            },
        )
        .await?;

        match read_packet(&mut reader).await? {
            Some(Packet::Connected {
                identity_id,
                name,
                progress,
            }) => {
                info!("Connected as {} (identity {})", name, identity_id);

                let (tx, incoming) = mpsc::unbounded_channel();
                tokio::spawn(Self::read_loop(reader, tx));

                Ok(Client {
                    writer,
                    incoming,
                    identity_id,
                    name,
                    progress,
                })
            }
            Some(Packet::Disconnected { reason }) => Err(ClientError::Refused(reason)),
            Some(other) => Err(ClientError::UnexpectedPacket(other.name())),
            None => Err(ClientError::Closed),
        }
    }

    async fn read_loop<R>(mut reader: R, tx: mpsc::UnboundedSender<Packet>)
    where
        R: AsyncRead + Unpin,
    {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if tx.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Error reading from server: {}", e);
                    break;
                }
            }
        }
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Progress the server had stored for us at login
    pub fn progress(&self) -> Option<&GameProgress> {
        self.progress.as_ref()
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        write_packet(&mut self.writer, packet).await?;
        Ok(())
    }

    /// Enters the world with the stored progress, or new-player defaults
    pub async fn join(&mut self) -> Result<(), ClientError> {
        let progress = self.progress.clone().unwrap_or_default();
        self.send(&Packet::Join {
            position: progress.position,
            level: progress.level,
            hp: progress.hp,
            max_hp: progress.max_hp,
        })
        .await
    }

    pub async fn move_to(&mut self, position: Position) -> Result<(), ClientError> {
        self.send(&Packet::Move { position }).await
    }

    pub async fn pvp_attack(
        &mut self,
        target_player_id: IdentityId,
        damage: u32,
    ) -> Result<(), ClientError> {
        self.send(&Packet::PvpAttack {
            target_player_id,
            damage,
        })
        .await
    }

    pub async fn request_leaderboard(&mut self, limit: u32) -> Result<(), ClientError> {
        self.send(&Packet::LeaderboardRequest { limit }).await
    }

    /// Waits for the next packet from the server
    pub async fn recv(&mut self) -> Result<Packet, ClientError> {
        self.incoming.recv().await.ok_or(ClientError::Closed)
    }

    /// Like `recv`, but gives up after `wait` and returns `None`
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<Packet>, ClientError> {
        match timeout(wait, self.incoming.recv()).await {
            Ok(Some(packet)) => Ok(Some(packet)),
            Ok(None) => Err(ClientError::Closed),
            Err(_) => Ok(None),
        }
    }

    /// Next already-received packet, if any
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.incoming.try_recv().ok()
    }

    /// Says goodbye and closes the connection
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        self.send(&Packet::Disconnect).await?;
        info!("Disconnected from server");
        Ok(())
    }
}
