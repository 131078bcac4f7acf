// =============================================================================
// Alpha Vantage time-series glue
// =============================================================================
//
// Maps dashboard timeframes onto Alpha Vantage query functions and decodes the
// nested `"Time Series (...)"` payload:
//
//   { "Meta Data": {...},
//     "Time Series (Daily)": {
//        "2024-03-15": { "1. open": "171.0", ..., "5. volume": "123456" },
//        ... } }
//
// The date keys arrive as an unordered map, so every decoded series is sorted
// ascending before it leaves this module.
// =============================================================================

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::FetchError;
use crate::types::{Bar, Series, Timeframe};

/// Keys Alpha Vantage uses to report errors and throttling in a 200 response.
const DIAGNOSTIC_KEYS: &[&str] = &["Error Message", "Note", "Information"];

/// Query `function` for a timeframe.
pub fn series_function(timeframe: &Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneDay | Timeframe::OneWeek => "TIME_SERIES_INTRADAY",
        Timeframe::OneMonth | Timeframe::ThreeMonths => "TIME_SERIES_DAILY",
        _ => "TIME_SERIES_WEEKLY",
    }
}

/// Bar interval sent with every request (only intraday functions read it).
pub fn intraday_interval(timeframe: &Timeframe) -> &'static str {
    if timeframe.is_intraday() {
        "5min"
    } else {
        "60min"
    }
}

/// Decode a time-series response body into an ascending [`Series`].
pub fn parse_time_series(body: &Value) -> Result<Series, FetchError> {
    let root = body
        .as_object()
        .ok_or_else(|| FetchError::Parse("response is not a JSON object".into()))?;

    for key in DIAGNOSTIC_KEYS {
        if let Some(msg) = root.get(*key).and_then(Value::as_str) {
            return Err(FetchError::Provider(msg.to_string()));
        }
    }

    let entries = root
        .iter()
        .find(|(key, _)| key.contains("Time Series"))
        .map(|(_, v)| v)
        .ok_or(FetchError::MissingSeries)?
        .as_object()
        .ok_or_else(|| FetchError::Parse("time series is not an object".into()))?;

    let mut series = Vec::with_capacity(entries.len());
    for (date, entry) in entries {
        series.push(Bar {
            date: date.clone(),
            open: parse_price(entry, "1. open", date)?,
            high: parse_price(entry, "2. high", date)?,
            low: parse_price(entry, "3. low", date)?,
            close: parse_price(entry, "4. close", date)?,
            volume: parse_volume(entry, date)?,
        });
    }

    sort_series(&mut series);
    Ok(series)
}

/// Sort bars ascending by their date label.
///
/// Labels are compared as timestamps (daily and intraday formats both parse);
/// anything unparseable sorts first, then by raw label.
pub fn sort_series(series: &mut Series) {
    series.sort_by(|a, b| {
        bar_time(&a.date)
            .cmp(&bar_time(&b.date))
            .then_with(|| a.date.cmp(&b.date))
    });
}

fn bar_time(label: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(label, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(label, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn field_str<'a>(entry: &'a Value, name: &str, date: &str) -> Result<&'a str, FetchError> {
    entry
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Parse(format!("missing field {name:?} at {date}")))
}

fn parse_price(entry: &Value, name: &str, date: &str) -> Result<f64, FetchError> {
    let raw = field_str(entry, name, date)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|e| FetchError::Parse(format!("{name} at {date}: {raw:?} ({e})")))
}

fn parse_volume(entry: &Value, date: &str) -> Result<u64, FetchError> {
    let raw = field_str(entry, "5. volume", date)?;
    raw.trim()
        .parse::<u64>()
        .map_err(|e| FetchError::Parse(format!("5. volume at {date}: {raw:?} ({e})")))
}
