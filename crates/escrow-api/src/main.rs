//! # escrow-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the escrow marketplace.
//! Binds to configurable port (default 8080).

use anyhow::Context;

use escrow_api::state::{AppConfig, AppState};
use escrow_engine::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("invalid server configuration")?;
    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set; bearer secrets are not checked");
    }
    tracing::info!(?config, ?engine_config, "configuration loaded");

    let port = config.port;
    let state = AppState::with_config(config, engine_config);
    let app = escrow_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("escrow API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
