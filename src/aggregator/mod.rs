// =============================================================================
// Data Aggregator — quote + series + indicators -> dashboard snapshot
// =============================================================================
//
// One refresh cycle:
//   1. fetch the quote and the price series concurrently
//   2. derive price / change / change% from the quote
//   3. run DEMA(short), DEMA(long) and support/resistance over the closes
//   4. assemble the `ChartData` the presentation layer draws
//
// `subscription` owns the polling loop and the published snapshot; this file
// holds the data types and the pure assembly functions.
// =============================================================================

pub mod subscription;

pub use subscription::Subscription;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::indicators::{calculate_dema, identify_support_resistance};
use crate::provider::MarketDataProvider;
use crate::types::{Bar, Quote, Timeframe};

/// The only failure text the dashboard ever shows.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch stock data. Please try again later.";

// =============================================================================
// Settings
// =============================================================================

/// The parameter tuple a subscription polls for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StockSettings {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub dema_short_period: usize,
    pub dema_long_period: usize,
    /// Level de-duplication tolerance, in percent.
    pub sr_sensitivity: f64,
    pub sr_lookback_period: usize,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::OneMonth,
            dema_short_period: 9,
            dema_long_period: 21,
            sr_sensitivity: 3.0,
            sr_lookback_period: 50,
        }
    }
}

impl StockSettings {
    /// Validate and canonicalise (trimmed, upper-case symbol).
    pub fn normalized(mut self) -> Result<Self> {
        self.symbol = self.symbol.trim().to_uppercase();
        if self.symbol.is_empty() {
            bail!("symbol must not be empty");
        }
        if self.dema_short_period == 0 || self.dema_long_period == 0 {
            bail!("DEMA periods must be at least 1");
        }
        if self.sr_lookback_period == 0 {
            bail!("support/resistance lookback must be at least 1");
        }
        if !self.sr_sensitivity.is_finite() || self.sr_sensitivity < 0.0 {
            bail!("support/resistance sensitivity must be a non-negative number");
        }
        Ok(self)
    }
}

// =============================================================================
// Output types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedQuote {
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemaPair {
    pub short: Vec<f64>,
    pub long: Vec<f64>,
}

/// Column-oriented chart payload; every per-bar vector has the series length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub dates: Vec<String>,
    pub prices: Vec<f64>,
    pub volumes: Vec<u64>,
    pub is_up: Vec<bool>,
    pub dema: DemaPair,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
}

/// What the presentation layer binds to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub loading: bool,
    pub error: Option<String>,
    pub quote: Option<DerivedQuote>,
    pub chart_data: Option<ChartData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorState {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl Default for AggregatorState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for AggregatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Published state of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Incremented on every publish.
    pub version: u64,
    pub state: AggregatorState,
    /// Tuple of the most recently started cycle.
    pub settings: StockSettings,
    #[serde(flatten)]
    pub result: AggregateResult,
}

impl DashboardSnapshot {
    pub fn idle(settings: StockSettings) -> Self {
        Self {
            version: 0,
            state: AggregatorState::Idle,
            settings,
            result: AggregateResult::default(),
        }
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Price, absolute change and percent change against the previous close.
///
/// A zero previous close yields a 0% change instead of an infinity.
pub fn derive_quote(quote: &Quote) -> DerivedQuote {
    let change = quote.c - quote.pc;
    let change_percent = if quote.pc.abs() > f64::EPSILON {
        change / quote.pc * 100.0
    } else {
        0.0
    };
    DerivedQuote {
        price: quote.c,
        change,
        change_percent,
    }
}

/// Run the indicator engine over the closes of `series`.
pub fn build_chart_data(series: &[Bar], settings: &StockSettings) -> ChartData {
    let prices: Vec<f64> = series.iter().map(|b| b.close).collect();

    let dema = DemaPair {
        short: calculate_dema(&prices, settings.dema_short_period),
        long: calculate_dema(&prices, settings.dema_long_period),
    };
    let levels =
        identify_support_resistance(&prices, settings.sr_sensitivity, settings.sr_lookback_period);

    ChartData {
        dates: series.iter().map(|b| b.date.clone()).collect(),
        volumes: series.iter().map(|b| b.volume).collect(),
        is_up: series.iter().map(|b| b.close >= b.open).collect(),
        prices,
        dema,
        support_levels: levels.support,
        resistance_levels: levels.resistance,
    }
}

/// One fetch + compute pass. Both fetches run concurrently; indicators are
/// computed only after both have resolved.
pub async fn compute_cycle<P: MarketDataProvider>(
    provider: &P,
    settings: &StockSettings,
) -> Result<(DerivedQuote, ChartData)> {
    let (quote, series) = tokio::join!(
        provider.quote(&settings.symbol),
        provider.series(&settings.symbol, &settings.timeframe),
    );

    let quote = quote.with_context(|| format!("quote for {}", settings.symbol))?;
    let series = series.with_context(|| {
        format!("{} series for {}", settings.timeframe, settings.symbol)
    })?;

    Ok((derive_quote(&quote), build_chart_data(&series, settings)))
}
