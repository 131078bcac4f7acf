// =============================================================================
// Stock data client — Finnhub + Alpha Vantage with synthetic fallback
// =============================================================================
//
// SECURITY: API keys are sent as query parameters (both providers require
// that) and are never logged.  `#[instrument]` spans skip `self`.
//
// Every public `fetch_*` method is infallible: the matching `try_*` method
// does the real work and any `FetchError` is replaced with data from
// `provider::fallback`.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{alpha_vantage, fallback, finnhub, FetchError, MarketDataProvider};
use crate::runtime_config::DashboardConfig;
use crate::types::{Candles, Quote, Series, Timeframe};

/// Upstream API keys. Empty strings count as missing.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
}

impl ProviderCredentials {
    /// Read `FINNHUB_API_KEY` and `ALPHA_VANTAGE_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            finnhub_api_key: std::env::var("FINNHUB_API_KEY").ok(),
            alpha_vantage_api_key: std::env::var("ALPHA_VANTAGE_API_KEY").ok(),
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("finnhub_api_key", &self.finnhub_api_key.as_ref().map(|_| "***"))
            .field("alpha_vantage_api_key", &self.alpha_vantage_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

fn non_empty(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty())
}

/// HTTP client for quotes, candles and time series.
#[derive(Clone)]
pub struct StockClient {
    http: reqwest::Client,
    finnhub_api_key: Option<String>,
    alpha_vantage_api_key: Option<String>,
    finnhub_base_url: String,
    alpha_vantage_base_url: String,
    rng: Arc<Mutex<StdRng>>,
}

impl StockClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(config: &DashboardConfig, credentials: ProviderCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("stock-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;

        let rng = match config.fallback_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let finnhub_api_key = non_empty(credentials.finnhub_api_key);
        let alpha_vantage_api_key = non_empty(credentials.alpha_vantage_api_key);

        debug!(
            finnhub_base_url = %config.finnhub_base_url,
            alpha_vantage_base_url = %config.alpha_vantage_base_url,
            finnhub_key = finnhub_api_key.is_some(),
            alpha_vantage_key = alpha_vantage_api_key.is_some(),
            "StockClient initialised"
        );

        Ok(Self {
            http,
            finnhub_api_key,
            alpha_vantage_api_key,
            finnhub_base_url: config.finnhub_base_url.trim_end_matches('/').to_string(),
            alpha_vantage_base_url: config.alpha_vantage_base_url.clone(),
            rng: Arc::new(Mutex::new(rng)),
        })
    }

    // -------------------------------------------------------------------------
    // Infallible API (fallback on any error)
    // -------------------------------------------------------------------------

    /// Current quote for `symbol`, or the fixed fallback quote.
    pub async fn fetch_quote(&self, symbol: &str) -> Quote {
        match self.try_fetch_quote(symbol).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(symbol, error = %e, "quote fetch failed — using fallback quote");
                fallback::fallback_quote(Utc::now().timestamp())
            }
        }
    }

    /// Ascending price history for `symbol`, or a synthetic random walk.
    pub async fn fetch_series(&self, symbol: &str, timeframe: &Timeframe) -> Series {
        match self.try_fetch_series(symbol, timeframe).await {
            Ok(series) => series,
            Err(e) => {
                warn!(
                    symbol,
                    timeframe = %timeframe,
                    error = %e,
                    "time series fetch failed — using synthetic series"
                );
                self.fallback_series(timeframe)
            }
        }
    }

    /// Candles for `symbol` in `[from, to]` (unix seconds), or synthetic ones.
    pub async fn fetch_candles(&self, symbol: &str, resolution: &str, from: i64, to: i64) -> Candles {
        match self.try_fetch_candles(symbol, resolution, from, to).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(symbol, resolution, error = %e, "candle fetch failed — using synthetic candles");
                self.fallback_candles()
            }
        }
    }

    fn fallback_series(&self, timeframe: &Timeframe) -> Series {
        let mut rng = self.rng.lock();
        fallback::generate_series(timeframe, Utc::now().naive_utc(), &mut *rng)
    }

    fn fallback_candles(&self) -> Candles {
        let mut rng = self.rng.lock();
        fallback::generate_candles(Utc::now().timestamp(), &mut *rng)
    }

    // -------------------------------------------------------------------------
    // Fallible API
    // -------------------------------------------------------------------------

    /// GET {finnhub}/quote
    #[instrument(skip(self), name = "finnhub::quote")]
    pub async fn try_fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let token = self
            .finnhub_api_key
            .as_deref()
            .ok_or(FetchError::MissingApiKey("Finnhub"))?;

        let url = format!("{}/quote", self.finnhub_base_url);
        let body = self
            .get_json("finnhub", &url, &[("symbol", symbol), ("token", token)])
            .await?;

        let quote = finnhub::parse_quote(body)?;
        debug!(symbol, price = quote.c, "quote retrieved");
        Ok(quote)
    }

    /// GET {finnhub}/stock/candle
    #[instrument(skip(self), name = "finnhub::candles")]
    pub async fn try_fetch_candles(
        &self,
        symbol: &str,
        resolution: &str,
        from: i64,
        to: i64,
    ) -> Result<Candles, FetchError> {
        let token = self
            .finnhub_api_key
            .as_deref()
            .ok_or(FetchError::MissingApiKey("Finnhub"))?;

        let url = format!("{}/stock/candle", self.finnhub_base_url);
        let from = from.to_string();
        let to = to.to_string();
        let body = self
            .get_json(
                "finnhub",
                &url,
                &[
                    ("symbol", symbol),
                    ("resolution", resolution),
                    ("from", &from),
                    ("to", &to),
                    ("token", token),
                ],
            )
            .await?;

        let candles = finnhub::parse_candles(body)?;
        debug!(symbol, count = candles.t.len(), "candles retrieved");
        Ok(candles)
    }

    /// GET {alpha vantage}?function=TIME_SERIES_*
    #[instrument(skip(self), name = "alpha_vantage::series")]
    pub async fn try_fetch_series(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
    ) -> Result<Series, FetchError> {
        let apikey = self
            .alpha_vantage_api_key
            .as_deref()
            .ok_or(FetchError::MissingApiKey("Alpha Vantage"))?;

        let body = self
            .get_json(
                "alpha vantage",
                &self.alpha_vantage_base_url,
                &[
                    ("function", alpha_vantage::series_function(timeframe)),
                    ("symbol", symbol),
                    ("interval", alpha_vantage::intraday_interval(timeframe)),
                    ("outputsize", "compact"),
                    ("apikey", apikey),
                ],
            )
            .await?;

        let series = alpha_vantage::parse_time_series(&body)?;
        debug!(symbol, timeframe = %timeframe, bars = series.len(), "time series retrieved");
        Ok(series)
    }

    async fn get_json(
        &self,
        service: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let resp = self.http.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { service, status });
        }

        let body = resp.json::<Value>().await?;
        Ok(body)
    }
}

impl MarketDataProvider for StockClient {
    async fn quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        Ok(self.fetch_quote(symbol).await)
    }

    async fn series(&self, symbol: &str, timeframe: &Timeframe) -> anyhow::Result<Series> {
        Ok(self.fetch_series(symbol, timeframe).await)
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
