// =============================================================================
// Exponential Moving Average (EMA) / Double EMA (DEMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//   DEMA       = 2 * EMA(closes) - EMA(EMA(closes))
//
// The first EMA value is seeded with the SMA of the first `period` values.
// Every output is left-padded with zeros so that index `i` of the result lines
// up with index `i` of the input; the chart relies on that alignment.
// =============================================================================

/// Compute the zero-padded EMA series for `values`.
///
/// The result always has `values.len()` elements. The first `period - 1`
/// positions are `0.0` placeholders.
///
/// # Edge cases
/// - `period == 0` => all zeros
/// - `values.len() < period` => all zeros
fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return vec![0.0; values.len()];
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(values.len());
    result.resize(period - 1, 0.0);
    result.push(seed);

    let mut prev_ema = seed;
    for &value in &values[period..] {
        let ema = (value - prev_ema) * multiplier + prev_ema;
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// Compute the Double Exponential Moving Average of `closes`.
///
/// The inner EMA is fed the *padded* first EMA, so its SMA seed averages the
/// leading zeros of that series. This matches what the dashboard has always
/// plotted and is not the textbook DEMA warm-up.
///
/// Returns all zeros (same length as `closes`) when there are fewer closes
/// than `period`.
pub fn calculate_dema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return vec![0.0; closes.len()];
    }

    let ema1 = calculate_ema(closes, period);
    let ema2 = calculate_ema(&ema1, period);

    ema1.iter()
        .zip(ema2.iter())
        .map(|(e1, e2)| 2.0 * e1 - e2)
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero_is_all_zeros() {
        assert_eq!(calculate_ema(&[1.0, 2.0, 3.0], 0), vec![0.0; 3]);
    }

    #[test]
    fn ema_insufficient_data_is_all_zeros() {
        assert_eq!(calculate_ema(&[1.0, 2.0], 5), vec![0.0, 0.0]);
    }

    #[test]
    fn ema_length_and_padding_hold_for_every_period() {
        let closes = ascending(40);
        for period in 1..=40 {
            let ema = calculate_ema(&closes, period);
            assert_eq!(ema.len(), closes.len(), "period {period}");
            assert!(
                ema[..period - 1].iter().all(|v| *v == 0.0),
                "period {period} padding not zero"
            );
            assert!(ema[period - 1] > 0.0, "period {period} seed missing");
        }
    }

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema.len(), 3);
        assert!((ema[2] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..10]: SMA seed 3.0, multiplier 1/3.
        let closes = ascending(10);
        let ema = calculate_ema(&closes, 5);

        let mult = 2.0 / 6.0;
        let mut expected = vec![0.0; 4];
        let mut prev = 3.0;
        expected.push(prev);
        for &c in &closes[5..] {
            prev = (c - prev) * mult + prev;
            expected.push(prev);
        }
        for (a, b) in ema.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    // ---- calculate_dema --------------------------------------------------

    #[test]
    fn dema_insufficient_data_is_all_zeros() {
        assert_eq!(calculate_dema(&[5.0, 6.0, 7.0], 9), vec![0.0; 3]);
        assert!(calculate_dema(&[], 3).is_empty());
    }

    #[test]
    fn dema_reproduces_nested_padding() {
        // period 2 over [1..5]:
        //   ema1 = [0, 1.5, 2.5, 3.5, 4.5]
        //   ema2 seed = (0 + 1.5) / 2 = 0.75, then the usual recurrence.
        let closes = ascending(5);
        let dema = calculate_dema(&closes, 2);
        assert_eq!(dema.len(), 5);
        assert_eq!(dema[0], 0.0);

        let mult = 2.0 / 3.0;
        let ema1 = [0.0, 1.5, 2.5, 3.5, 4.5];
        let mut ema2 = vec![0.0, 0.75];
        for i in 2..5 {
            let prev = ema2[i - 1];
            ema2.push((ema1[i] - prev) * mult + prev);
        }
        for i in 1..5 {
            let expected = 2.0 * ema1[i] - ema2[i];
            assert!(
                (dema[i] - expected).abs() < 1e-10,
                "index {i}: got {}, expected {expected}",
                dema[i]
            );
        }
        assert!((dema[1] - 2.25).abs() < 1e-10);
    }

    #[test]
    fn dema_nine_and_twenty_one_over_thirty_bars() {
        let closes: Vec<f64> = (0..30).map(|i| 150.0 + (i as f64 * 0.7).sin() * 4.0).collect();

        let short = calculate_dema(&closes, 9);
        let long = calculate_dema(&closes, 21);

        assert_eq!(short.len(), 30);
        assert_eq!(long.len(), 30);
        assert!(short[..8].iter().all(|v| *v == 0.0));
        assert!(long[..20].iter().all(|v| *v == 0.0));
        assert!(short[8] != 0.0);
        assert!(long[20] != 0.0);
    }

    #[test]
    fn dema_on_flat_series_converges_to_price() {
        let closes = vec![100.0; 200];
        let dema = calculate_dema(&closes, 10);
        assert!((dema[199] - 100.0).abs() < 1e-6);
    }
}
