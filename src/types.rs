// =============================================================================
// Shared types used across the stock dashboard
// =============================================================================

use serde::{Deserialize, Serialize};

/// Current-price snapshot as returned by the quote service.
///
/// Field names follow the provider payload (`c`, `h`, `l`, `o`, `pc`, `t`) so
/// the struct deserialises straight from the response body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Current price.
    pub c: f64,
    /// High price of the day.
    pub h: f64,
    /// Low price of the day.
    pub l: f64,
    /// Open price of the day.
    pub o: f64,
    /// Previous close price.
    pub pc: f64,
    /// Unix timestamp (seconds).
    #[serde(default)]
    pub t: i64,
}

/// One trading-period observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// `YYYY-MM-DD` for daily data, `YYYY-MM-DD HH:MM:SS` for intraday.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Bars ordered by date ascending.
pub type Series = Vec<Bar>;

/// Columnar candle payload from the quote/candle service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candles {
    /// Close prices.
    pub c: Vec<f64>,
    /// High prices.
    pub h: Vec<f64>,
    /// Low prices.
    pub l: Vec<f64>,
    /// Open prices.
    pub o: Vec<f64>,
    /// Status, `"ok"` on success.
    pub s: String,
    /// Unix timestamps (seconds).
    pub t: Vec<i64>,
    /// Volumes.
    pub v: Vec<u64>,
}

/// Coarse duration selector for the chart.
///
/// Unknown labels are carried through as [`Timeframe::Other`] rather than
/// rejected; they pick up the default behaviour wherever a timeframe matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Timeframe {
    OneDay,
    OneWeek,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    FiveYears,
    Other(String),
}

impl Timeframe {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
            Self::FiveYears => "5Y",
            Self::Other(raw) => raw,
        }
    }

    /// Whether bars for this timeframe are hourly rather than daily.
    pub fn is_intraday(&self) -> bool {
        matches!(self, Self::OneDay)
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::OneMonth
    }
}

impl From<&str> for Timeframe {
    fn from(raw: &str) -> Self {
        match raw {
            "1D" => Self::OneDay,
            "1W" => Self::OneWeek,
            "1M" => Self::OneMonth,
            "3M" => Self::ThreeMonths,
            "6M" => Self::SixMonths,
            "1Y" => Self::OneYear,
            "5Y" => Self::FiveYears,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Timeframe {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_known_labels() {
        assert_eq!(Timeframe::from("1D"), Timeframe::OneDay);
        assert_eq!(Timeframe::from("5Y"), Timeframe::FiveYears);
        assert_eq!(Timeframe::from("3M").to_string(), "3M");
    }

    #[test]
    fn timeframe_keeps_unknown_labels() {
        let tf = Timeframe::from("2W");
        assert_eq!(tf, Timeframe::Other("2W".into()));
        assert_eq!(tf.as_str(), "2W");
        assert!(!tf.is_intraday());
    }

    #[test]
    fn timeframe_serialises_as_plain_string() {
        let json = serde_json::to_string(&Timeframe::OneWeek).unwrap();
        assert_eq!(json, "\"1W\"");
        let back: Timeframe = serde_json::from_str("\"1Y\"").unwrap();
        assert_eq!(back, Timeframe::OneYear);
    }

    #[test]
    fn quote_deserialises_provider_payload() {
        let json = r#"{"c":173.45,"d":2.25,"dp":1.3,"h":175.1,"l":172.3,"o":172.5,"pc":171.2,"t":1700000000}"#;
        let q: Quote = serde_json::from_str(json).unwrap();
        assert!((q.c - 173.45).abs() < f64::EPSILON);
        assert!((q.pc - 171.2).abs() < f64::EPSILON);
        assert_eq!(q.t, 1_700_000_000);
    }
}
