//! Server network layer handling TCP connections and the world loop

use crate::auth::{Authenticator, Identity};
use crate::config::ServerConfig;
use crate::session::{ConnectionHandle, ConnectionId};
use crate::sync::{SessionProgress, SyncGateway};
use crate::world::{Followup, World};
use log::{debug, error, info, warn};
use shared::{
    read_packet, write_packet, FrameError, GameProgress, IdentityId, Packet, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, interval_at, timeout};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const SHUTDOWN_REASON: &str = "Server shutting down";
pub const VERSION_MISMATCH: &str = "Protocol version mismatch";
pub const HANDSHAKE_TIMEOUT: &str = "Authentication timeout";

/// Messages sent to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Authenticated {
        connection_id: ConnectionId,
        identity: Identity,
        handle: ConnectionHandle,
    },
    /// Stored progress for an admitted connection, read after every save
    /// queued before its admission
    ProgressLoaded {
        connection_id: ConnectionId,
        progress: Option<GameProgress>,
    },
    PacketReceived {
        connection_id: ConnectionId,
        packet: Packet,
    },
    ConnectionClosed {
        connection_id: ConnectionId,
    },
    Shutdown,
}

/// Progress store work, run one job at a time in queue order
#[derive(Debug)]
enum StoreJob {
    Save(Vec<SessionProgress>),
    Load {
        connection_id: ConnectionId,
        identity_id: IdentityId,
    },
}

/// Asks a running server to save everything and stop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Shutdown requested after the server already stopped");
        }
    }
}

/// What every connection task needs, cloned once per connection
#[derive(Clone)]
struct ConnectionContext {
    authenticator: Arc<Authenticator>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    handshake_timeout: Duration,
}

/// Main server coordinating connections and the world
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
    world: World,
    gateway: Arc<SyncGateway>,
    flush_interval: Duration,
    context: ConnectionContext,

    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        authenticator: Arc<Authenticator>,
        gateway: Arc<SyncGateway>,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            acceptor: None,
            world: World::from_config(&config),
            gateway,
            flush_interval: config.flush_interval.max(Duration::from_secs(1)),
            context: ConnectionContext {
                authenticator,
                server_tx,
                handshake_timeout: config.handshake_timeout,
            },
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server_tx: self.context.server_tx.clone(),
        }
    }

    /// Spawns task that accepts connections and starts one task per socket
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            warn!("Acceptor already running");
            return;
        };
        let context = self.context.clone();

        self.acceptor = Some(tokio::spawn(async move {
            let mut next_id: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let connection_id = next_id;
                        next_id += 1;

                        debug!("Accepted connection {} from {}", connection_id, addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tokio::spawn(Self::handle_connection(
                            stream,
                            addr,
                            connection_id,
                            context.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        }));
    }

    /// Spawns task that runs store jobs in the order they were queued
    ///
    /// A load queued after a save of the same player always sees that save.
    fn spawn_store_worker(
        gateway: Arc<SyncGateway>,
        server_tx: mpsc::UnboundedSender<ServerMessage>,
        mut jobs: mpsc::UnboundedReceiver<StoreJob>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let gateway = Arc::clone(&gateway);

                match job {
                    StoreJob::Save(batch) => {
                        let total = batch.len();
                        match tokio::task::spawn_blocking(move || gateway.flush(&batch)).await {
                            Ok(saved) => debug!("Saved progress for {}/{} players", saved, total),
                            Err(e) => error!("Progress save task failed: {}", e),
                        }
                    }
                    StoreJob::Load {
                        connection_id,
                        identity_id,
                    } => {
                        let loaded =
                            tokio::task::spawn_blocking(move || gateway.load_snapshot(identity_id))
                                .await;
                        let progress = match loaded {
                            Ok(Ok(progress)) => Some(progress),
                            Ok(Err(e)) => {
                                warn!("Failed to load progress for identity {}: {}", identity_id, e);
                                None
                            }
                            Err(e) => {
                                error!("Progress load task failed: {}", e);
                                None
                            }
                        };

                        let message = ServerMessage::ProgressLoaded {
                            connection_id,
                            progress,
                        };
                        if server_tx.send(message).is_err() {
                            debug!("Server gone before connection {} was greeted", connection_id);
                        }
                    }
                }
            }
        })
    }

    /// Reads one connection until it closes
    ///
    /// Nothing reaches the world loop before the handshake succeeds, so a
    /// refused connection is never seen by the registry.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        connection_id: ConnectionId,
        context: ConnectionContext,
    ) {
        let (mut reader, mut writer) = stream.into_split();

        let handshake = timeout(
            context.handshake_timeout,
            Self::handshake(&mut reader, &context),
        )
        .await;
        let identity = match handshake {
            Ok(Ok(identity)) => identity,
            Ok(Err(reason)) => {
                Self::refuse(&mut writer, connection_id, addr, reason).await;
                return;
            }
            Err(_) => {
                Self::refuse(&mut writer, connection_id, addr, HANDSHAKE_TIMEOUT.to_string())
                    .await;
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(Self::write_loop(writer, rx, connection_id));

        let authenticated = ServerMessage::Authenticated {
            connection_id,
            identity,
            handle: ConnectionHandle::new(tx),
        };
        if let Err(e) = context.server_tx.send(authenticated) {
            error!("Failed to send connection to main loop: {}", e);
            return;
        }

        Self::read_loop(reader, connection_id, &context.server_tx, writer_task).await;

        if context
            .server_tx
            .send(ServerMessage::ConnectionClosed { connection_id })
            .is_err()
        {
            debug!("Server gone before connection {} closed", connection_id);
        }
    }

    /// Expects `Connect` and verifies its token
    async fn handshake<R>(reader: &mut R, context: &ConnectionContext) -> Result<Identity, String>
    where
        R: AsyncRead + Unpin,
    {
        let token = match read_packet(reader).await {
            Ok(Some(Packet::Connect {
                client_version,
                token,
            })) => {
                if client_version != PROTOCOL_VERSION {
                    return Err(VERSION_MISMATCH.to_string());
                }
                token
            }
            Ok(Some(other)) => return Err(format!("Expected connect, got {}", other.name())),
            Ok(None) => return Err("Connection closed during handshake".to_string()),
            Err(e) => return Err(e.to_string()),
        };

        context
            .authenticator
            .authenticate(&token)
            .map_err(|e| e.to_string())
    }

    async fn refuse(
        writer: &mut OwnedWriteHalf,
        connection_id: ConnectionId,
        addr: SocketAddr,
        reason: String,
    ) {
        warn!(
            "Refusing connection {} from {}: {}",
            connection_id, addr, reason
        );
        if let Err(e) = write_packet(writer, &Packet::Disconnected { reason }).await {
            debug!("Failed to tell connection {} why: {}", connection_id, e);
        }
        let _ = writer.shutdown().await;
    }

    /// Forwards packets to the world loop until the peer closes or the
    /// writer stops, which happens once the world drops the connection
    async fn read_loop<R>(
        mut reader: R,
        connection_id: ConnectionId,
        server_tx: &mpsc::UnboundedSender<ServerMessage>,
        mut writer_task: JoinHandle<()>,
    ) where
        R: AsyncRead + Unpin,
    {
        loop {
            let read = tokio::select! {
                read = read_packet(&mut reader) => read,
                _ = &mut writer_task => {
                    debug!("Connection {} dropped by the server", connection_id);
                    break;
                }
            };

            match read {
                Ok(Some(packet)) => {
                    let message = ServerMessage::PacketReceived {
                        connection_id,
                        packet,
                    };
                    if server_tx.send(message).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Connection {} closed by peer", connection_id);
                    break;
                }
                Err(e) => {
                    warn!("Dropping connection {}: {}", connection_id, e);
                    break;
                }
            }
        }
    }

    /// Drains one connection's outbound queue onto its socket
    async fn write_loop<W>(
        mut writer: W,
        mut rx: mpsc::UnboundedReceiver<Packet>,
        connection_id: ConnectionId,
    ) where
        W: AsyncWrite + Unpin,
    {
        while let Some(packet) = rx.recv().await {
            match write_packet(&mut writer, &packet).await {
                Ok(()) => {}
                Err(FrameError::Io(e)) => {
                    debug!("Failed to write to connection {}: {}", connection_id, e);
                    break;
                }
                Err(e) => {
                    error!(
                        "Closing connection {}: cannot send {}: {}",
                        connection_id,
                        packet.name(),
                        e
                    );
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    }

    fn answer_leaderboard(&self, handle: ConnectionHandle, limit: usize) {
        let gateway = Arc::clone(&self.gateway);

        tokio::spawn(async move {
            match tokio::task::spawn_blocking(move || gateway.top_players(limit)).await {
                Ok(Ok(entries)) => {
                    handle.send(Packet::Leaderboard { entries });
                }
                Ok(Err(e)) => error!("Failed to load leaderboard: {}", e),
                Err(e) => error!("Leaderboard task failed: {}", e),
            }
        });
    }

    fn queue_save(jobs: &mpsc::UnboundedSender<StoreJob>, batch: Vec<SessionProgress>) {
        if batch.is_empty() {
            return;
        }
        if let Err(e) = jobs.send(StoreJob::Save(batch)) {
            error!("Failed to queue progress save: {}", e);
        }
    }

    /// Main server loop: one world step per message
    pub async fn run(&mut self) -> ServerResult<()> {
        self.spawn_acceptor();

        let (jobs, job_rx) = mpsc::unbounded_channel();
        let store_worker = Self::spawn_store_worker(
            Arc::clone(&self.gateway),
            self.context.server_tx.clone(),
            job_rx,
        );

        let period = self.flush_interval;
        let mut flush_interval = interval_at(time::Instant::now() + period, period);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Authenticated { connection_id, identity, handle }) => {
                            let identity_id = identity.identity_id;
                            let admission = self.world.admit(connection_id, identity, handle);
                            if let Some(evicted) = admission.evicted {
                                Self::queue_save(&jobs, vec![evicted]);
                            }
                            if admission.accepted {
                                let load = StoreJob::Load { connection_id, identity_id };
                                if let Err(e) = jobs.send(load) {
                                    error!("Failed to queue progress load: {}", e);
                                }
                            }
                        },
                        Some(ServerMessage::ProgressLoaded { connection_id, progress }) => {
                            self.world.greet(connection_id, progress);
                        },
                        Some(ServerMessage::PacketReceived { connection_id, packet }) => {
                            match self.world.handle_packet(connection_id, packet, Instant::now()) {
                                Followup::None => {},
                                Followup::Departed(progress) => Self::queue_save(&jobs, vec![progress]),
                                Followup::Leaderboard { handle, limit } => self.answer_leaderboard(handle, limit),
                            }
                        },
                        Some(ServerMessage::ConnectionClosed { connection_id }) => {
                            if let Some(progress) = self.world.disconnect(connection_id) {
                                Self::queue_save(&jobs, vec![progress]);
                            }
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = flush_interval.tick() => {
                    let batch = self.world.progress_batch();
                    debug!("Periodic save for {} online players", batch.len());
                    Self::queue_save(&jobs, batch);
                },
            }
        }

        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }

        let batch = self.world.shutdown(SHUTDOWN_REASON);
        info!("Saving progress for {} players", batch.len());
        Self::queue_save(&jobs, batch);

        drop(jobs);
        store_worker.await?;

        Ok(())
    }
}
