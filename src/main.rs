//! # Merchant Passkey Server
//!
//! Binary entry point: logging, configuration, state, background purge of
//! stale challenges, then the HTTP server.

use merchant_passkey::config::Config;
use merchant_passkey::state::AppState;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,merchant_passkey=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        rp_id = %config.rp_id,
        rp_origin = %config.rp_origin,
        database = %config.database_url,
        "configuration loaded"
    );

    let bind_addr = config.bind_address();
    let app_state = AppState::new(config).await?;
    tracing::info!("application state initialized");

    merchant_passkey::spawn_challenge_purge(&app_state, Duration::from_secs(60));

    let app = merchant_passkey::app(app_state);

    tracing::info!("starting server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
