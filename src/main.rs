// SPDX-License-Identifier: MIT

//! Live activity API server.
//!
//! Accepts reports from watches, phones, manual entry and the nutrition log,
//! reconciles them into one live snapshot per user, and streams every change
//! to connected devices.

use live_activity::{
    config::{Config, StoreKind},
    db::{FirestoreDb, MemoryStore, StoreBackend},
    time_utils::SystemClock,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        store = ?config.store,
        suppression_window_secs = config.engine.suppression_window_secs,
        utc_offset_minutes = config.engine.utc_offset_minutes,
        "Starting live activity API"
    );

    let store = match config.store {
        StoreKind::Firestore => {
            StoreBackend::Firestore(FirestoreDb::new(&config.gcp_project_id).await?)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            StoreBackend::Memory(MemoryStore::new())
        }
    };

    let clock = Arc::new(SystemClock::new(config.engine.utc_offset()?));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store, clock)?);

    // Build router
    let app = live_activity::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("live_activity=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
