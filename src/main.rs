//! Snowfight Game Server
//!
//! Starts the physics world and serves players over WebSocket.
//!
//! Usage: `snowfight-server [config.json]`

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use snowfight::{
    AppConfig, GameSession, Messenger, PhysicsWorld, VERSION,
    network::{ChannelMessenger, GameServer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Snowfight Server v{}", VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => AppConfig::default(),
    };
    info!(
        "Map {}x{}, {} Hz, player speed {}",
        config.world.map_size, config.world.map_size, config.world.tick_rate, config.player.move_distance
    );

    let world = Arc::new(PhysicsWorld::new(config.world.clone()).context("building world")?);
    let stepping = world.start().context("starting world thread")?;

    let messenger = Arc::new(ChannelMessenger::new());
    let routed: Arc<dyn Messenger> = messenger.clone();
    let session = Arc::new(GameSession::new(
        world.clone(),
        routed,
        config.player.clone(),
        config.projectile.clone(),
    ));
    let server = Arc::new(GameServer::new(config.server.clone(), session.clone(), messenger));

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Cannot listen for ctrl-c: {}", e);
            }
            info!("Shutting down");
            server.shutdown();
        }
        finished = serving => {
            finished.context("server task failed")??;
        }
    }

    session.shutdown();
    world.stop();
    if stepping.join().is_err() {
        warn!("World thread exited abnormally");
    }
    info!("World stopped after {} ticks", world.tick_count());

    Ok(())
}
