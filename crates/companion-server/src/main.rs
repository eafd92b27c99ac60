mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use companion_api::auth::{AppState, AppStateInner};
use companion_core::opener::OpeningRotation;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = companion_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        settings: config.settings,
        openers: OpeningRotation::default(),
    });

    let app = companion_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!(
        addr = %config.addr,
        db = %config.db_path.display(),
        memory_policy = ?config.settings.chat_memory_policy,
        "companion server listening"
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
