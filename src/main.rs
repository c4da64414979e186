// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User Accounts API Server
//!
//! Registration, login and profile management over a Firestore `users`
//! collection, packaged for Cloud Run.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_accounts::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, InMemoryUserStore, UserStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting User Accounts API");

    let store: Arc<dyn UserStore> = match config.user_store {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on restart");
            Arc::new(InMemoryUserStore::new())
        }
    };

    let port = config.port;
    let state = Arc::new(AppState::new(config, store));
    let app = user_accounts::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
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
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("user_accounts=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
