//! Crash Rocket Server
//!
//! Authoritative crash-game round scheduler. Runs the phase driver and the
//! WebSocket fanout server over a shared in-memory round store.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crash_rocket::{
    config::{GameConfig, ServerConfig},
    game::{driver::Driver, scheduler::Scheduler, store::MemoryRoundStore},
    network::server::{BroadcastHooks, WsServer},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let game_config = GameConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    info!("Crash Rocket Server v{}", VERSION);
    info!("Bind address: {}", server_config.bind_addr);
    info!(
        "Phase timings: waiting {:?}, crashed {:?}, tick {:?}",
        game_config.waiting_duration, game_config.crashed_duration, game_config.tick_interval
    );
    info!("Crash-point mode: {:?}", game_config.mode);
    if server_config.driver_secret.is_empty() {
        info!("Wire-driven advances disabled (no driver secret configured)");
    }

    // Fanout of wire events to all connections; phase-change hooks and the
    // driver's periodic snapshots both feed it
    let (fanout_tx, _) = broadcast::channel(256);
    let (updates_tx, _) = broadcast::channel(256);
    let (shutdown_tx, _) = broadcast::channel(1);

    let store = Arc::new(MemoryRoundStore::new());
    let scheduler = Arc::new(Scheduler::new(
        store,
        BroadcastHooks::new(fanout_tx.clone()),
        game_config.clone(),
        boot_entropy(),
    ));

    let driver = Driver::new(
        scheduler.clone(),
        game_config,
        updates_tx.clone(),
        shutdown_tx.subscribe(),
    );
    let driver_handle = tokio::spawn(driver.run());

    let server = Arc::new(WsServer::new(
        server_config,
        scheduler,
        fanout_tx,
        updates_tx,
    ));
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");

    let _ = shutdown_tx.send(());
    server.shutdown();

    let _ = driver_handle.await;
    server_task.await??;

    info!("Shutdown complete");
    Ok(())
}

/// Derive per-process boot entropy from the wall clock.
///
/// Crash points are reproducible within a process lifetime but not
/// predictable across restarts.
fn boot_entropy() -> [u8; 32] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut hasher = Sha256::new();
    hasher.update(b"CRASH_ROCKET_BOOT_V1");
    hasher.update(nanos.to_le_bytes());
    hasher.finalize().into()
}
