mod cache;
mod catalog;
mod config;
mod db;
mod errors;
mod generation;
mod models;
mod providers;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::catalog::ChecklistCatalog;
use crate::config::Config;
use crate::db::{create_pool, init_schema};
use crate::generation::run::RunRegistry;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting guidance cache API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite and bootstrap the schema
    let db = create_pool(&config.database_url).await?;
    init_schema(&db).await?;

    // Load the external checklist catalog (read-only input)
    let catalog = Arc::new(ChecklistCatalog::load(&config.checklist_path)?);

    // Build app state
    let state = AppState {
        db,
        catalog,
        config: config.clone(),
        runs: RunRegistry::new(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
