// =============================================================================
// Finnhub payload decoding
// =============================================================================
//
// Quote:   { "c": 173.45, "h": 175.1, "l": 172.3, "o": 172.5, "pc": 171.2, "t": 1700000000 }
// Candles: { "c": [...], "h": [...], "l": [...], "o": [...], "s": "ok", "t": [...], "v": [...] }
//
// Finnhub reports failures as `{ "error": "..." }` and empty candle ranges as
// `{ "s": "no_data" }`; both become `FetchError`s here.

use serde_json::Value;

use super::FetchError;
use crate::types::{Candles, Quote};

fn provider_error(body: &Value) -> Option<FetchError> {
    body.get("error")
        .and_then(Value::as_str)
        .map(|msg| FetchError::Provider(msg.to_string()))
}

pub fn parse_quote(body: Value) -> Result<Quote, FetchError> {
    if let Some(err) = provider_error(&body) {
        return Err(err);
    }
    serde_json::from_value(body).map_err(|e| FetchError::Parse(format!("quote: {e}")))
}

pub fn parse_candles(body: Value) -> Result<Candles, FetchError> {
    if let Some(err) = provider_error(&body) {
        return Err(err);
    }
    match body.get("s").and_then(Value::as_str) {
        Some("ok") => {}
        Some(status) => return Err(FetchError::Provider(format!("candle status {status}"))),
        None => return Err(FetchError::Parse("candles: missing status".into())),
    }

    let candles: Candles =
        serde_json::from_value(body).map_err(|e| FetchError::Parse(format!("candles: {e}")))?;

    let n = candles.t.len();
    let ragged = [
        candles.c.len(),
        candles.h.len(),
        candles.l.len(),
        candles.o.len(),
        candles.v.len(),
    ]
    .iter()
    .any(|len| *len != n);
    if ragged {
        return Err(FetchError::Parse("candles: column lengths differ".into()));
    }

    Ok(candles)
}
