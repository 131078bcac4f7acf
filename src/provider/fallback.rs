// =============================================================================
// Synthetic Fallback Data
// =============================================================================
//
// Used whenever an upstream fetch fails so the chart always has something with
// the right shape to draw.  The random source is a parameter so tests can pin
// the output with a seeded `StdRng`.
//
// Series generator (per bar, walking from `points` bars ago up to now):
//   current += U[-2.5, 2.5)           floored at 0.7 * BASE_PRICE
//   open     = current
//   close    = open + U[-1.5, 1.5)
//   high     = max(open, close) + U[0, 2)
//   low      = min(open, close) - U[0, 2)
//   volume   = U{1_000_000 .. 11_000_000}
// =============================================================================

use chrono::{Duration, NaiveDateTime};
use rand::Rng;

use crate::types::{Bar, Candles, Quote, Series, Timeframe};

/// Starting price for synthetic series and candles.
pub const BASE_PRICE: f64 = 150.0;

/// Number of bars requested for candle fallbacks.
pub const FALLBACK_CANDLE_COUNT: usize = 30;

const MIN_VOLUME: u64 = 1_000_000;
const MAX_VOLUME: u64 = 11_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Fixed quote describing a small positive day.
pub fn fallback_quote(now_secs: i64) -> Quote {
    Quote {
        c: 173.45,
        h: 175.1,
        l: 172.3,
        o: 172.5,
        pc: 171.2,
        t: now_secs,
    }
}

/// Nominal number of points for a timeframe.
///
/// The generator emits one more bar than this because it walks the inclusive
/// range `points..=0`.
pub fn fallback_point_count(timeframe: &Timeframe) -> usize {
    match timeframe {
        Timeframe::OneDay => 24,
        Timeframe::OneWeek => 7,
        Timeframe::OneMonth => 30,
        Timeframe::ThreeMonths => 90,
        Timeframe::SixMonths => 180,
        Timeframe::OneYear => 365,
        Timeframe::FiveYears => 260,
        Timeframe::Other(_) => 30,
    }
}

/// Generate a random-walk series ending at `now`, oldest bar first.
pub fn generate_series<R: Rng + ?Sized>(
    timeframe: &Timeframe,
    now: NaiveDateTime,
    rng: &mut R,
) -> Series {
    let points = fallback_point_count(timeframe);
    let floor = BASE_PRICE * 0.7;
    let mut current = BASE_PRICE;
    let mut series = Vec::with_capacity(points + 1);

    for back in (0..=points).rev() {
        let date = if timeframe.is_intraday() {
            (now - Duration::hours(back as i64))
                .format("%Y-%m-%d %H:00:00")
                .to_string()
        } else {
            (now.date() - Duration::days(back as i64))
                .format("%Y-%m-%d")
                .to_string()
        };

        current = (current + rng.gen_range(-2.5..2.5)).max(floor);

        let open = current;
        let close = open + rng.gen_range(-1.5..1.5);
        let high = open.max(close) + rng.gen_range(0.0..2.0);
        let low = open.min(close) - rng.gen_range(0.0..2.0);
        let volume = rng.gen_range(MIN_VOLUME..MAX_VOLUME);

        series.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    series
}

/// Generate [`FALLBACK_CANDLE_COUNT`] daily candles ending one day before
/// `now_secs`.
pub fn generate_candles<R: Rng + ?Sized>(now_secs: i64, rng: &mut R) -> Candles {
    let n = FALLBACK_CANDLE_COUNT;
    let mut candles = Candles {
        c: Vec::with_capacity(n),
        h: Vec::with_capacity(n),
        l: Vec::with_capacity(n),
        o: Vec::with_capacity(n),
        s: "ok".to_string(),
        t: Vec::with_capacity(n),
        v: Vec::with_capacity(n),
    };

    for i in 0..n {
        let timestamp = now_secs - (n - i) as i64 * SECONDS_PER_DAY;
        let open = BASE_PRICE + rng.gen_range(0.0..10.0);
        let close = open + rng.gen_range(-5.0..5.0);
        let high = open.max(close) + rng.gen_range(0.0..5.0);
        let low = open.min(close) - rng.gen_range(0.0..5.0);
        let volume = rng.gen_range(MIN_VOLUME..MAX_VOLUME);

        candles.t.push(timestamp);
        candles.o.push(open);
        candles.c.push(close);
        candles.h.push(high);
        candles.l.push(low);
        candles.v.push(volume);
    }

    candles
}
