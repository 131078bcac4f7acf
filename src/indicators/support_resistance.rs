// =============================================================================
// Support / Resistance Level Detection
// =============================================================================
//
// Scans the close series with a symmetric window of `lookback` bars on each
// side.  A bar is a local minimum when nothing in its window is strictly lower,
// and a local maximum when nothing is strictly higher (a perfectly flat window
// counts as both).
//
// Detected extrema become levels unless they sit within `sensitivity_pct` of a
// level already accepted on the same side:
//
//   duplicate  <=>  |existing - candidate| / candidate < sensitivity_pct / 100
//
// Levels are accepted in scan (chronological) order and each side keeps only
// the first MAX_LEVELS.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Maximum number of levels reported per side.
pub const MAX_LEVELS: usize = 5;

/// Deduplicated support and resistance prices, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportResistance {
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

/// Identify support and resistance levels in `prices`.
///
/// # Edge cases
/// - `prices.len() < lookback` => both sides empty
/// - `prices.len() < 2 * lookback + 1` => scan range is empty, both sides empty
/// - `lookback == 0` => every bar is its own window and registers on both sides
pub fn identify_support_resistance(
    prices: &[f64],
    sensitivity_pct: f64,
    lookback: usize,
) -> SupportResistance {
    let mut levels = SupportResistance::default();
    if prices.len() < lookback {
        return levels;
    }

    let threshold = sensitivity_pct / 100.0;
    let end = prices.len().saturating_sub(lookback);

    for i in lookback..end {
        let candidate = prices[i];
        let window = &prices[i - lookback..=i + lookback];

        // The candidate itself is in the window but can never be strictly
        // lower or higher than itself.
        let is_min = !window.iter().any(|&p| p < candidate);
        let is_max = !window.iter().any(|&p| p > candidate);

        if is_min {
            accept_level(&mut levels.support, candidate, threshold);
        }
        if is_max {
            accept_level(&mut levels.resistance, candidate, threshold);
        }
    }

    levels.support.truncate(MAX_LEVELS);
    levels.resistance.truncate(MAX_LEVELS);
    levels
}

fn accept_level(levels: &mut Vec<f64>, candidate: f64, threshold: f64) {
    let is_close = levels
        .iter()
        .any(|level| (level - candidate).abs() / candidate < threshold);
    if !is_close {
        levels.push(candidate);
    }
}
