// =============================================================================
// Central Application State — Stock Dashboard
// =============================================================================
//
// Ties the polling subscription and the upstream client together for the
// REST API and the WebSocket feed.  Shared across tasks as `Arc<AppState>`.
//
// The subscription owns its own interior mutability; the only state kept here
// is bookkeeping for the health endpoint.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::aggregator::{DashboardSnapshot, StockSettings, Subscription};
use crate::provider::StockClient;
use crate::runtime_config::DashboardConfig;

pub struct AppState {
    /// The single dashboard subscription.
    pub subscription: Subscription<StockClient>,

    /// Shared upstream client, also used directly by the candles endpoint.
    pub client: StockClient,

    /// Number of currently open WebSocket connections.
    pub ws_connections: AtomicU64,

    started_at: Instant,
}

/// Liveness summary for `/api/v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: &'static str,
    pub state: String,
    pub version: u64,
    pub symbol: String,
    pub running: bool,
    pub ws_connections: u64,
    pub uptime_secs: u64,
    pub server_time: i64,
}

impl AppState {
    /// Build the state. The subscription is created idle; call
    /// [`start`](Subscription::start) once inside the runtime.
    pub fn new(config: &DashboardConfig, client: StockClient, settings: StockSettings) -> Self {
        let subscription =
            Subscription::new(client.clone(), settings, config.refresh_interval());

        Self {
            subscription,
            client,
            ws_connections: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.subscription.snapshot()
    }

    pub fn health(&self) -> HealthSummary {
        let snapshot = self.subscription.snapshot();
        HealthSummary {
            status: "ok",
            state: snapshot.state.to_string(),
            version: snapshot.version,
            symbol: snapshot.settings.symbol,
            running: self.subscription.is_running(),
            ws_connections: self.ws_connections.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            server_time: chrono::Utc::now().timestamp_millis(),
        }
    }
}
