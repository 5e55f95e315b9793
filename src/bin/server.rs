//! Trafego Server
//!
//! Hosted backend for the trafego CLI: stores tool records, products,
//! ledger entries and saved analyses, streams tool changes over WebSocket
//! and runs campaign analyses through Gemini.
//!
//! See [`trafego::server`] for the environment variables, config file
//! format and routes.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trafego::analysis::GeminiAnalyzer;
use trafego::backend::{RealtimeHub, SqliteBackend};
use trafego::db::init_db;
use trafego::server::{router, ApiKeyStore, AppState, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trafego_server=info,trafego=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    std::fs::create_dir_all(&config.data_dir)?;
    let pool = init_db(&config.database_path()).await?;
    let backend = SqliteBackend::new(pool, Arc::new(RealtimeHub::new()));

    let api_keys = ApiKeyStore::load(&config.config_path);

    let analyzer = GeminiAnalyzer::from_env();
    if !analyzer.has_api_key() {
        tracing::warn!("GEMINI_API_KEY is not set - analyses will fail");
    }

    let state = AppState::new(backend, api_keys, Arc::new(analyzer));
    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
