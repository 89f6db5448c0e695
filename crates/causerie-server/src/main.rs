//! # causerie-server
//!
//! Real-time delivery core for the Causerie messaging application.
//!
//! This binary provides:
//! - **WebSocket gateway** carrying the live event contract: presence
//!   announcements, message delivery, read receipts, typing signals
//! - **In-memory presence registry** -- the authoritative "who is online"
//!   map, rebuilt from client re-announces after a restart
//! - **Durable message store** (SQLite) written before any live push, so an
//!   offline receiver finds every message on their next history fetch
//! - **REST API** (axum) for conversation lists, paginated history, unread
//!   counts, read acknowledgments, and windowed message deletion
//! - **Per-user flood control** on socket events

mod api;
mod auth;
mod config;
mod error;
mod flood;
mod gateway;
mod presence;
mod receipts;
mod router;
mod storage;
mod typing;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use causerie_store::Database;

use crate::api::AppState;
use crate::auth::{InsecureTokenResolver, StoreUserDirectory};
use crate::config::ServerConfig;
use crate::flood::FloodControl;
use crate::presence::PresenceRegistry;
use crate::receipts::ReadReceiptReconciler;
use crate::router::DeliveryRouter;
use crate::storage::MessageService;
use crate::typing::TypingRelay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,causerie_server=debug")),
        )
        .init();

    info!("Starting Causerie server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Message store (creates the database file and schema if missing)
    let database = Database::open_at(&config.database_path)?;
    let store = MessageService::new(database, config.storage_timeout);

    // Presence registry: one owned instance shared by every component,
    // intentionally not a global
    let presence = Arc::new(PresenceRegistry::new());

    // Account-subsystem seams: a store-backed user directory and the
    // development token resolver (a deployment wires in its JWT verifier)
    let directory = Arc::new(StoreUserDirectory::new(store.clone()));
    let identity = Arc::new(InsecureTokenResolver);

    let router = Arc::new(DeliveryRouter::new(
        store.clone(),
        presence.clone(),
        directory,
    ));
    let receipts = Arc::new(ReadReceiptReconciler::new(store.clone(), presence.clone()));
    let typing = Arc::new(TypingRelay::new(presence.clone()));

    // Per-user send limiter
    let flood = FloodControl::new(config.send_rate, config.send_burst);

    let app_state = AppState {
        config: Arc::new(config.clone()),
        store,
        presence,
        router,
        receipts,
        typing,
        flood: flood.clone(),
        identity,
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic flood-bucket cleanup (every 5 minutes, evict buckets idle >10 min)
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            flood.purge_stale(600.0).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    // tokio::select! ensures that if either the server or a shutdown signal
    // arrives, we exit cleanly.
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
