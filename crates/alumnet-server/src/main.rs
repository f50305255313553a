//! # alumnet-server
//!
//! Presence and direct-messaging server for the alumni network.
//!
//! This binary provides:
//! - **REST API** (axum) for conversation partners, message history and
//!   durable message submission
//! - **WebSocket endpoint** that tracks who is online and pushes new
//!   messages to receivers that are currently connected

mod api;
mod auth;
mod config;
mod delivery;
mod error;
mod hub;
mod presence;
mod ws;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use alumnet_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,alumnet_server=debug,alumnet_store=info")),
        )
        .init();

    info!("Starting alumnet server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the message store and the (empty) presence hub
    // -----------------------------------------------------------------------
    let db = match config.database_path {
        Some(ref path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        hub: Hub::new(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
