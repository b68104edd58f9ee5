//! Tag Arena Server - authoritative server for real-time multiplayer tag
//!
//! One simulation task owns the physics world and the round state machine.
//! Clients connect over WebSocket, send movement input and receive snapshots.

mod app;
mod config;
mod game;
mod http;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::map::Map;
use crate::game::rapier::{RapierSettings, RapierWorld};
use crate::game::Arena;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Tag Arena Server");
    info!("Server address: {}", config.server_addr);

    let map = match &config.map_path {
        Some(path) => {
            info!(path = %path.display(), "Loading map");
            Map::from_file(path)?
        }
        None => Map::empty(config.arena_width, config.arena_height, config.wall_thickness)?,
    };
    let physics = RapierWorld::new(RapierSettings::default())?;

    let seed = config.rng_seed.unwrap_or_else(rand::random);
    info!(seed, "Session seed");

    let (arena, handle) = Arena::new(
        config.arena_settings(),
        config.session_settings(),
        map,
        physics,
        seed,
    );

    // Create application state
    let addr: SocketAddr = config.server_addr;
    let state = AppState::new(config, handle);

    // Spawn the simulation loop
    let arena_task = tokio::spawn(arena.run());

    // Build router
    let router = build_router(state);

    // Start server
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Upgraded sockets may still hold command senders
    arena_task.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
