// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  The browser dashboard is served from a
// different origin, so CORS is permissive.
//
//   GET  /api/v1/health      liveness + snapshot version
//   GET  /api/v1/dashboard   current DashboardSnapshot
//   GET  /api/v1/settings    current parameter tuple
//   POST /api/v1/settings    replace the tuple (400 on validation failure)
//   GET  /api/v1/candles     Finnhub candles, synthetic on failure
//   GET  /api/v1/ws          push feed (see `ws`)
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::aggregator::StockSettings;
use crate::app_state::AppState;

/// Default candle window when `from` is omitted.
const DEFAULT_CANDLE_WINDOW_SECS: i64 = 30 * 24 * 60 * 60;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/settings", get(get_settings).post(set_settings))
        .route("/api/v1/candles", get(candles))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health())
}

// =============================================================================
// Dashboard snapshot
// =============================================================================

async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.snapshot())
}

// =============================================================================
// Settings
// =============================================================================

async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.subscription.settings())
}

async fn set_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<StockSettings>,
) -> Response {
    match state.subscription.update_settings(settings) {
        Ok(changed) => {
            let accepted = state.subscription.settings();
            info!(
                symbol = %accepted.symbol,
                timeframe = %accepted.timeframe,
                changed,
                "settings updated via API"
            );
            Json(accepted).into_response()
        }
        Err(e) => {
            warn!(error = %e, "rejected settings update");
            bad_request(e.to_string())
        }
    }
}

// =============================================================================
// Candles
// =============================================================================

#[derive(Debug, Deserialize)]
struct CandleQuery {
    symbol: Option<String>,
    resolution: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
}

async fn candles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandleQuery>,
) -> Response {
    let symbol = match query.symbol {
        Some(s) => s.trim().to_uppercase(),
        None => state.subscription.settings().symbol,
    };
    if symbol.is_empty() {
        return bad_request("symbol must not be empty");
    }

    let resolution = query.resolution.unwrap_or_else(|| "D".to_string());
    let to = query.to.unwrap_or_else(|| Utc::now().timestamp());
    let from = query.from.unwrap_or(to.saturating_sub(DEFAULT_CANDLE_WINDOW_SECS));
    if from > to {
        return bad_request("`from` must not be after `to`");
    }

    let candles = state.client.fetch_candles(&symbol, &resolution, from, to).await;
    Json(candles).into_response()
}
