// =============================================================================
// Runtime Configuration — dashboard service settings
// =============================================================================
//
// Loaded once at startup from `dashboard_config.json`.  Every field carries a
// serde default so a missing or partial file still yields a usable config.
//
// API credentials are not part of this file; they come from the environment
// (`FINNHUB_API_KEY`, `ALPHA_VANTAGE_API_KEY`).
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregator::StockSettings;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_finnhub_base_url() -> String {
    "https://finnhub.io/api/v1".to_string()
}

fn default_alpha_vantage_base_url() -> String {
    "https://www.alphavantage.co/query".to_string()
}

// =============================================================================
// DashboardConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Address the dashboard API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Seconds between periodic refresh cycles.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Per-request timeout for upstream HTTP calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_finnhub_base_url")]
    pub finnhub_base_url: String,

    #[serde(default = "default_alpha_vantage_base_url")]
    pub alpha_vantage_base_url: String,

    /// Seed for synthetic fallback data. `None` seeds from OS entropy.
    #[serde(default)]
    pub fallback_seed: Option<u64>,

    /// Settings the subscription starts with.
    #[serde(default)]
    pub default_settings: StockSettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            refresh_interval_secs: default_refresh_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            finnhub_base_url: default_finnhub_base_url(),
            alpha_vantage_base_url: default_alpha_vantage_base_url(),
            fallback_seed: None,
            default_settings: StockSettings::default(),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dashboard config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse dashboard config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            symbol = %config.default_settings.symbol,
            "dashboard config loaded"
        );

        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
