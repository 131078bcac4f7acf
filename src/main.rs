// =============================================================================
// Stock Dashboard — Main Entry Point
// =============================================================================
//
// Boots the polling subscription for the configured parameter tuple and
// serves the REST + WebSocket surface the browser dashboard binds to.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod aggregator;
mod api;
mod app_state;
mod indicators;
mod provider;
mod runtime_config;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::provider::{ProviderCredentials, StockClient};
use crate::runtime_config::DashboardConfig;

const CONFIG_PATH: &str = "dashboard_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Stock Dashboard starting up");

    let mut config = DashboardConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        DashboardConfig::default()
    });

    if let Ok(addr) = std::env::var("DASHBOARD_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(symbol) = std::env::var("DASHBOARD_SYMBOL") {
        config.default_settings.symbol = symbol;
    }

    let settings = config
        .default_settings
        .clone()
        .normalized()
        .context("invalid default settings")?;

    // ── 2. Upstream client ───────────────────────────────────────────────
    let credentials = ProviderCredentials::from_env();
    if credentials.finnhub_api_key.is_none() || credentials.alpha_vantage_api_key.is_none() {
        warn!(?credentials, "API keys missing — synthetic fallback data will be served");
    }
    let client = StockClient::new(&config, credentials)?;

    // ── 3. Shared state + subscription ───────────────────────────────────
    let state = Arc::new(AppState::new(&config, client, settings));
    state.subscription.start();

    // ── 4. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    let app = api::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    state.subscription.stop();

    info!("Stock Dashboard shut down complete.");
    Ok(())
}
