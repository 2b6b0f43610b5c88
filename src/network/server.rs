//! WebSocket Round Server
//!
//! Async WebSocket shell around the scheduler. Connected clients receive
//! every published round snapshot and phase-change event, and can ask for
//! the current round on demand; external drivers holding the shared secret
//! can advance the state machine over the wire.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::round::{Phase, Round, RoundSnapshot};
use crate::game::scheduler::{RoundHooks, Scheduler};
use crate::game::store::{RoundStore, StoreError};
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage, WireError};

/// Forward every Nth intra-flight snapshot to clients. Phase edges always
/// go out; in between, clients recompute the curve locally, so the full
/// tick rate on the wire would be wasted bandwidth.
const FLIGHT_SNAPSHOT_DECIMATION: u64 = 5;

/// Decides which driver snapshots reach the wire.
///
/// Any snapshot whose phase differs from the previous one is a phase edge
/// and is forwarded unconditionally; only repeated intra-flight ticks are
/// decimated.
struct SnapshotDecimator {
    last_phase: Option<Phase>,
    flight_ticks: u64,
}

impl SnapshotDecimator {
    fn new() -> Self {
        Self {
            last_phase: None,
            flight_ticks: 0,
        }
    }

    fn admit(&mut self, snapshot: &RoundSnapshot) -> bool {
        let phase_changed = self.last_phase != Some(snapshot.phase);
        self.last_phase = Some(snapshot.phase);

        if snapshot.phase != Phase::Flying || phase_changed {
            self.flight_ticks = 0;
            return true;
        }

        self.flight_ticks += 1;
        self.flight_ticks % FLIGHT_SNAPSHOT_DECIMATION == 0
    }
}

/// Round server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Hooks implementation that turns phase transitions into wire events.
///
/// Wired into the scheduler so the CAS winner's transition reaches every
/// subscribed client: `RoundOpen` when betting opens (the upcoming crash
/// point is already fixed by then), `RoundCrashed` on the terminal write.
#[derive(Clone)]
pub struct BroadcastHooks {
    fanout: broadcast::Sender<ServerMessage>,
}

impl BroadcastHooks {
    /// Wrap a fanout channel.
    pub fn new(fanout: broadcast::Sender<ServerMessage>) -> Self {
        Self { fanout }
    }
}

impl RoundHooks for BroadcastHooks {
    fn on_round_crashed(&self, round: &Round) {
        let _ = self.fanout.send(ServerMessage::RoundCrashed(round.snapshot()));
    }

    fn on_round_opened(&self, round: &Round) {
        let _ = self.fanout.send(ServerMessage::RoundOpen(round.snapshot()));
    }
}

/// Connected client state.
struct ConnectedClient {
    /// Connection identifier (for logs).
    #[allow(dead_code)]
    id: Uuid,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerMessage>,
}

/// The round server.
pub struct WsServer<S: RoundStore, H: RoundHooks> {
    /// Server configuration.
    config: ServerConfig,
    /// The scheduler behind the wire surface.
    scheduler: Arc<Scheduler<S, H>>,
    /// Fanout of wire events to all connections.
    fanout: broadcast::Sender<ServerMessage>,
    /// Snapshot feed published by the in-process driver.
    updates: broadcast::Sender<RoundSnapshot>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl<S: RoundStore, H: RoundHooks> WsServer<S, H> {
    /// Create a new round server.
    pub fn new(
        config: ServerConfig,
        scheduler: Arc<Scheduler<S, H>>,
        fanout: broadcast::Sender<ServerMessage>,
        updates: broadcast::Sender<RoundSnapshot>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            scheduler,
            fanout,
            updates,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), WsServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Round server listening on {}", self.config.bind_addr);

        // Forward driver snapshots into the wire fanout
        let mut updates_rx = self.updates.subscribe();
        let forward_fanout = self.fanout.clone();
        let mut forward_shutdown = self.shutdown_tx.subscribe();
        let forward_handle = tokio::spawn(async move {
            let mut decimator = SnapshotDecimator::new();
            loop {
                tokio::select! {
                    update = updates_rx.recv() => match update {
                        Ok(snapshot) => {
                            if decimator.admit(&snapshot) {
                                let _ = forward_fanout.send(ServerMessage::Round(snapshot));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "snapshot forwarder lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = forward_shutdown.recv() => break,
                }
            }
        });

        // Spawn idle-connection cleanup task
        let cleanup_clients = self.clients.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
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

        forward_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let scheduler = self.scheduler.clone();
        let config = self.config.clone();
        let mut fanout_rx = self.fanout.subscribe();
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
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    id: Uuid::new_v4(),
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                });
            }

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
            });

            // Greet with the current round so the view can render immediately
            match scheduler.current() {
                Ok(snapshot) => {
                    let _ = msg_tx.send(ServerMessage::Round(snapshot)).await;
                }
                Err(e) => {
                    warn!("Could not read current round for {}: {}", addr, e);
                }
            }

            // Handle incoming messages and fanout
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::Error(WireError {
                                            code: ErrorCode::InvalidInput,
                                            message: "Invalid message format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                let response = respond_to(client_msg, &scheduler, &config);
                                let _ = msg_tx.send(response).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: server_time_millis(),
                                }).await;
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
                    event = fanout_rx.recv() => {
                        match event {
                            Ok(msg) => {
                                let _ = msg_tx.send(msg).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!("Client {} lagged {} events", addr, skipped);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();
            clients.write().await.remove(&addr);
            info!("Client {} cleaned up", addr);
        });
    }

    /// Run cleanup loop for idle connections.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            let now = Instant::now();
            let to_remove: Vec<_> = {
                let clients = clients.read().await;
                clients.iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect()
            };

            for addr in to_remove {
                let mut clients = clients.write().await;
                if clients.remove(&addr).is_some() {
                    info!("Removed idle client {}", addr);
                }
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Compute the response to a single client message.
fn respond_to<S: RoundStore, H: RoundHooks>(
    msg: ClientMessage,
    scheduler: &Scheduler<S, H>,
    config: &ServerConfig,
) -> ServerMessage {
    match msg {
        ClientMessage::CurrentRound => match scheduler.current() {
            Ok(snapshot) => ServerMessage::Round(snapshot),
            Err(e) => store_error_message(e),
        },
        ClientMessage::Advance(req) => {
            if config.driver_secret.is_empty() || req.secret != config.driver_secret {
                return ServerMessage::Error(WireError {
                    code: ErrorCode::Unauthorized,
                    message: "Invalid driver secret".to_string(),
                });
            }
            match scheduler.advance(req.action) {
                Ok(snapshot) => ServerMessage::Round(snapshot),
                Err(e) => store_error_message(e),
            }
        }
        ClientMessage::Ping { timestamp } => ServerMessage::Pong {
            timestamp,
            server_time: server_time_millis(),
        },
    }
}

/// Map a store failure to its wire form.
fn store_error_message(e: StoreError) -> ServerMessage {
    let code = match e {
        StoreError::Unavailable(_) => ErrorCode::StoreUnavailable,
        StoreError::Conflict => ErrorCode::InternalError,
    };
    ServerMessage::Error(WireError {
        code,
        message: e.to_string(),
    })
}

/// Milliseconds since the Unix epoch.
fn server_time_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::round::Phase;
    use crate::game::scheduler::AdvanceAction;
    use crate::game::store::MemoryRoundStore;
    use crate::network::protocol::AdvanceRequest;

    fn test_scheduler() -> Arc<Scheduler<MemoryRoundStore, BroadcastHooks>> {
        let (fanout, _) = broadcast::channel(16);
        Arc::new(Scheduler::new(
            Arc::new(MemoryRoundStore::new()),
            BroadcastHooks::new(fanout),
            GameConfig::default(),
            [1; 32],
        ))
    }

    fn test_server_config() -> ServerConfig {
        ServerConfig {
            driver_secret: "hunter2".to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_current_round_response() {
        let scheduler = test_scheduler();
        let response = respond_to(ClientMessage::CurrentRound, &scheduler, &test_server_config());
        match response {
            ServerMessage::Round(snap) => {
                assert_eq!(snap.round_id, 1);
                assert_eq!(snap.phase, Phase::Waiting);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_advance_rejects_bad_secret() {
        let scheduler = test_scheduler();
        let response = respond_to(
            ClientMessage::Advance(AdvanceRequest {
                action: AdvanceAction::Start,
                secret: "wrong".to_string(),
            }),
            &scheduler,
            &test_server_config(),
        );
        match response {
            ServerMessage::Error(err) => assert_eq!(err.code, ErrorCode::Unauthorized),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_advance_disabled_without_secret() {
        let scheduler = test_scheduler();
        // Empty configured secret disables wire advances, even "matching" ones
        let config = ServerConfig::default();
        let response = respond_to(
            ClientMessage::Advance(AdvanceRequest {
                action: AdvanceAction::Start,
                secret: String::new(),
            }),
            &scheduler,
            &config,
        );
        assert!(matches!(response, ServerMessage::Error(_)));
    }

    #[test]
    fn test_advance_with_secret_is_benign_noop() {
        let scheduler = test_scheduler();
        // Betting window has not elapsed: the advance is a guarded no-op
        let response = respond_to(
            ClientMessage::Advance(AdvanceRequest {
                action: AdvanceAction::Start,
                secret: "hunter2".to_string(),
            }),
            &scheduler,
            &test_server_config(),
        );
        match response {
            ServerMessage::Round(snap) => assert_eq!(snap.phase, Phase::Waiting),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_ping_pong() {
        let scheduler = test_scheduler();
        let response = respond_to(
            ClientMessage::Ping { timestamp: 12345 },
            &scheduler,
            &test_server_config(),
        );
        match response {
            ServerMessage::Pong { timestamp, server_time } => {
                assert_eq!(timestamp, 12345);
                assert!(server_time > 0);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let (fanout, _) = broadcast::channel(16);
        let (updates, _) = broadcast::channel(16);
        let server = WsServer::new(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                ..ServerConfig::default()
            },
            test_scheduler(),
            fanout,
            updates,
        );

        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let (fanout, _) = broadcast::channel(16);
        let (updates, _) = broadcast::channel(16);
        let server = WsServer::new(ServerConfig::default(), test_scheduler(), fanout, updates);
        server.shutdown();
        // Should not panic
    }

    fn flight_snapshot(phase: Phase) -> RoundSnapshot {
        RoundSnapshot {
            round_id: 1,
            phase,
            multiplier: crate::core::multiplier::Multiplier::ONE,
            crash_point: crate::core::multiplier::Multiplier::from_hundredths(250),
            phase_start_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_takeoff_edge_always_forwarded() {
        let mut decimator = SnapshotDecimator::new();

        assert!(decimator.admit(&flight_snapshot(Phase::Waiting)));
        // The waiting -> flying edge goes out immediately, never held back
        // behind the decimation window
        assert!(decimator.admit(&flight_snapshot(Phase::Flying)));
    }

    #[test]
    fn test_intra_flight_ticks_are_decimated() {
        let mut decimator = SnapshotDecimator::new();
        assert!(decimator.admit(&flight_snapshot(Phase::Flying)));

        let forwarded = (0..FLIGHT_SNAPSHOT_DECIMATION as usize * 2)
            .filter(|_| decimator.admit(&flight_snapshot(Phase::Flying)))
            .count();
        assert_eq!(forwarded, 2);

        // The crash edge cuts through the window as well
        assert!(decimator.admit(&flight_snapshot(Phase::Crashed)));
        assert!(decimator.admit(&flight_snapshot(Phase::Waiting)));
    }

    #[test]
    fn test_broadcast_hooks_emit_events() {
        let (fanout, mut rx) = broadcast::channel(16);
        let hooks = BroadcastHooks::new(fanout);
        let round = Round::initial(
            crate::core::multiplier::Multiplier::from_hundredths(250),
            chrono::Utc::now(),
        );

        hooks.on_round_opened(&round);
        match rx.try_recv().unwrap() {
            ServerMessage::RoundOpen(snap) => assert_eq!(snap.round_id, 1),
            other => panic!("unexpected message: {other:?}"),
        }

        hooks.on_round_crashed(&round);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::RoundCrashed(_)));
    }
}
