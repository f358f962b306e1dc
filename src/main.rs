// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Presence-Accounts API Server

use presence_accounts::{
    config::{Config, StorageBackend},
    db::{FirestoreDb, MemoryDb, UserRepository},
    services::IdentityService,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.storage_backend,
        "Starting Presence-Accounts API"
    );

    let repo: Arc<dyn UserRepository> = match config.storage_backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, users are lost on restart");
            Arc::new(MemoryDb::new())
        }
        StorageBackend::Firestore => {
            let project_id = config
                .gcp_project_id
                .as_deref()
                .ok_or("GCP_PROJECT_ID is required for the firestore backend")?;
            Arc::new(FirestoreDb::new(project_id).await?)
        }
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        identity: IdentityService::new(repo),
    });

    let app = presence_accounts::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("presence_accounts=debug,info"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
