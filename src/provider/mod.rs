// =============================================================================
// Market Data Provider Module
// =============================================================================
//
// Two upstream services feed the dashboard:
//
//   1. Finnhub        — current quote and columnar candles
//   2. Alpha Vantage  — historical OHLCV time series
//
// Every fetch is a two-step affair: a `try_*` call that returns
// `Result<_, FetchError>`, followed by an explicit fallback step that swaps any
// error for synthetic, shape-compatible data.  Callers of the public `fetch_*`
// methods therefore never see a network error.

pub mod alpha_vantage;
pub mod client;
pub mod fallback;
pub mod finnhub;

pub use client::{ProviderCredentials, StockClient};

use std::future::Future;

use thiserror::Error;

use crate::types::{Quote, Series, Timeframe};

/// Everything that can go wrong between us and an upstream service.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("missing {0} API key")]
    MissingApiKey(&'static str),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned HTTP {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("provider error: {0}")]
    Provider(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("response does not contain a time series")]
    MissingSeries,
}

/// Source of quotes and price history for the aggregator.
///
/// [`StockClient`] never fails through this seam (it substitutes fallback
/// data), but the aggregator still treats an `Err` as a failed cycle.
pub trait MarketDataProvider: Send + Sync + 'static {
    fn quote(&self, symbol: &str) -> impl Future<Output = anyhow::Result<Quote>> + Send;

    fn series(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
    ) -> impl Future<Output = anyhow::Result<Series>> + Send;
}
