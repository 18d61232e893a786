//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Translates client messages into player actions and relays game events.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde::{Serialize, Deserialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::core::vec2::Vec2;
use crate::game::events::PlayerId;
use crate::game::player::{Player, PlayerProfile};
use crate::game::session::GameSession;
use crate::network::messenger::ChannelMessenger;
use crate::network::protocol::{
    ClientMessage, ErrorCode, JoinRequest, ServerMessage, WelcomeInfo,
};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue length per connection.
    pub outbound_queue: usize,
    /// Time allowed to flush the last messages of a closing connection (ms).
    pub close_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_queue: 64,
            close_grace_ms: 1000,
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after join).
    player_id: Option<PlayerId>,
    /// Connection time.
    connected_at: Instant,
}

/// Per-connection state owned by the connection task.
struct Connection {
    addr: SocketAddr,
    player: Option<Arc<Player>>,
    player_gone: Option<broadcast::Receiver<()>>,
    sender: mpsc::Sender<ServerMessage>,
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Player roster.
    session: Arc<GameSession>,
    /// Outbound routing for game events.
    messenger: Arc<ChannelMessenger>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    ///
    /// `messenger` must be the one `session` was built with.
    pub fn new(config: ServerConfig, session: Arc<GameSession>, messenger: Arc<ChannelMessenger>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            session,
            messenger,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and run the server.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("{}, rejecting {}", GameServerError::ConnectionLimitReached, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let session = self.session.clone();
        let messenger = self.messenger.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_queue.max(1));

            // Register client
            clients.write().await.insert(addr, ConnectedClient {
                player_id: None,
                connected_at: Instant::now(),
            });

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut conn = Connection {
                addr,
                player: None,
                player_gone: None,
                sender: msg_tx,
            };

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        conn.reply(ServerMessage::error(ErrorCode::InvalidInput, "Invalid message format")).await;
                                        continue;
                                    }
                                };

                                if !Self::handle_client_message(&mut conn, client_msg, &session, &messenger, &clients).await {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(_))) => {
                                conn.reply(ServerMessage::Pong { timestamp: 0, server_time: now_millis() }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = player_gone(&mut conn.player_gone) => {
                        warn!("Player for {} was disconnected by the server", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        conn.reply(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            if let Some(player) = conn.player.take() {
                messenger.unregister(player.id());
                session.leave(player.id());
            }
            drop(conn);

            // Let queued messages drain before the socket closes.
            let grace = Duration::from_millis(config.close_grace_ms);
            if tokio::time::timeout(grace, sender_task).await.is_err() {
                debug!("Outbound queue for {} not drained in time", addr);
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                info!("Client {} cleaned up after {:?}", addr, client.connected_at.elapsed());
            }
        });
    }

    /// Handle a client message. Returns false when the connection should close.
    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        session: &Arc<GameSession>,
        messenger: &Arc<ChannelMessenger>,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    ) -> bool {
        match msg {
            ClientMessage::Join(request) => {
                Self::handle_join(conn, request, session, messenger, clients).await;
            }
            ClientMessage::Move { dx, dy } => match &conn.player {
                Some(player) => player.set_movement(dx, dy),
                None => conn.reply(ServerMessage::error(ErrorCode::NotJoined, "Join before moving")).await,
            },
            ClientMessage::Throw { x, y } => {
                let Some(player) = conn.player.clone() else {
                    conn.reply(ServerMessage::error(ErrorCode::NotJoined, "Join before throwing")).await;
                    return true;
                };
                if let Err(e) = player.throw_projectile(Vec2::new(x, y)) {
                    debug!("Throw from {} rejected: {}", conn.addr, e);
                    conn.reply(ServerMessage::error(ErrorCode::InvalidInput, e.to_string())).await;
                }
            }
            ClientMessage::Ping { timestamp } => {
                conn.reply(ServerMessage::Pong { timestamp, server_time: now_millis() }).await;
            }
            ClientMessage::Leave => {
                debug!("Client {} left", conn.addr);
                return false;
            }
        }
        true
    }

    /// Handle a join request.
    async fn handle_join(
        conn: &mut Connection,
        request: JoinRequest,
        session: &Arc<GameSession>,
        messenger: &Arc<ChannelMessenger>,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    ) {
        if conn.player.is_some() {
            conn.reply(ServerMessage::error(ErrorCode::AlreadyJoined, "Already joined")).await;
            return;
        }

        let profile = PlayerProfile { name: request.name, skin: request.skin };
        let player = match session.join(profile) {
            Ok(player) => player,
            Err(e) => {
                warn!("Join from {} failed: {}", conn.addr, e);
                conn.reply(ServerMessage::error(ErrorCode::ServerOverloaded, e.to_string())).await;
                return;
            }
        };

        let world = session.world();
        let spawn = player.position().unwrap_or_else(|| world.center());
        messenger.register(player.id(), conn.sender.clone());
        conn.reply(ServerMessage::Welcome(WelcomeInfo {
            player_id: player.id(),
            x: spawn.x,
            y: spawn.y,
            map_size: world.config().map_size,
            tick_rate: world.config().tick_rate,
            server_version: crate::VERSION.to_string(),
        }))
        .await;
        session.introduce(player.id());
        player.start_game();

        if let Some(client) = clients.write().await.get_mut(&conn.addr) {
            client.player_id = Some(player.id());
        }
        conn.player_gone = Some(player.subscribe_shutdown());
        conn.player = Some(player);
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get joined player count.
    pub async fn player_count(&self) -> usize {
        self.clients.read().await.values().filter(|c| c.player_id.is_some()).count()
    }
}

impl Connection {
    async fn reply(&self, message: ServerMessage) {
        if self.sender.send(message).await.is_err() {
            debug!("Writer for {} already closed", self.addr);
        }
    }
}

/// Resolves when the joined player is disconnected from the server side.
async fn player_gone(receiver: &mut Option<broadcast::Receiver<()>>) {
    match receiver {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending().await,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// =============================================================================
// TESTS
// =============================================================================
