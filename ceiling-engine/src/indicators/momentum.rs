//! Momentum oscillators: RSI, Stochastic, Williams %R, ROC, CCI and
//! percentage price changes.

use super::{highest, lowest, Reading};

/// Neutral RSI reading.
pub const RSI_NEUTRAL: f64 = 50.0;

/// Wilder RSI values, one per bar from index `period` onward.
///
/// The first value seeds the average gain/loss with a simple mean over
/// `period` changes; later values use Wilder smoothing.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / n;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / n;

    let mut values = Vec::with_capacity(changes.len() - period + 1);
    values.push(rsi_from_averages(avg_gain, avg_loss));

    for change in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + change.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-change).max(0.0)) / n;
        values.push(rsi_from_averages(avg_gain, avg_loss));
    }

    values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        if avg_gain <= 0.0 {
            RSI_NEUTRAL
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
    }
}

/// Latest Wilder RSI; needs `period + 1` closes.
pub fn rsi(closes: &[f64], period: usize) -> Reading {
    match rsi_series(closes, period).last() {
        Some(&v) => Reading::Computed(v),
        None => Reading::Neutral(RSI_NEUTRAL),
    }
}

/// The last `count` RSI values, oldest first.
pub fn rsi_history(closes: &[f64], period: usize, count: usize) -> Vec<f64> {
    let series = rsi_series(closes, period);
    let start = series.len().saturating_sub(count);
    series[start..].to_vec()
}

fn stochastic_k_at(highs: &[f64], lows: &[f64], closes: &[f64], end: usize, period: usize) -> f64 {
    let start = end + 1 - period;
    let hh = highest(&highs[start..=end]);
    let ll = lowest(&lows[start..=end]);
    let range = hh - ll;
    if range <= 0.0 {
        50.0
    } else {
        ((closes[end] - ll) / range * 100.0).clamp(0.0, 100.0)
    }
}

/// Stochastic %K over `period` bars.
pub fn stochastic_k(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading {
    let len = closes.len();
    if period == 0 || len < period || highs.len() != len || lows.len() != len {
        return Reading::Neutral(50.0);
    }
    Reading::Computed(stochastic_k_at(highs, lows, closes, len - 1, period))
}

/// Stochastic %D: simple mean of the last `smooth` %K values.
pub fn stochastic_d(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    smooth: usize,
) -> Reading {
    let len = closes.len();
    if period == 0 || smooth == 0 || len < period + smooth - 1 || highs.len() != len || lows.len() != len
    {
        return Reading::Neutral(50.0);
    }

    let sum: f64 = (len - smooth..len)
        .map(|end| stochastic_k_at(highs, lows, closes, end, period))
        .sum();
    Reading::Computed(sum / smooth as f64)
}

/// Williams %R over `period` bars, in [-100, 0].
pub fn williams_r(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading {
    let len = closes.len();
    if period == 0 || len < period || highs.len() != len || lows.len() != len {
        return Reading::Neutral(-50.0);
    }

    let hh = highest(&highs[len - period..]);
    let ll = lowest(&lows[len - period..]);
    let range = hh - ll;
    if range <= 0.0 {
        return Reading::Computed(-50.0);
    }
    Reading::Computed(((hh - closes[len - 1]) / range * -100.0).clamp(-100.0, 0.0))
}

/// Percentage change of the last close versus `lookback` bars earlier.
///
/// Used for ROC, daily/2-day change and 5/10/20-day momentum.
pub fn change_pct(closes: &[f64], lookback: usize) -> Reading {
    let len = closes.len();
    if lookback == 0 || len < lookback + 1 {
        return Reading::Neutral(0.0);
    }

    let base = closes[len - 1 - lookback];
    if base == 0.0 {
        return Reading::Neutral(0.0);
    }
    Reading::Computed((closes[len - 1] - base) / base * 100.0)
}

/// Rate of change over `period` bars.
pub fn rate_of_change(closes: &[f64], period: usize) -> Reading {
    change_pct(closes, period)
}

/// Commodity Channel Index over `period` bars.
pub fn cci(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading {
    let len = closes.len();
    if period == 0 || len < period || highs.len() != len || lows.len() != len {
        return Reading::Neutral(0.0);
    }

    let typical: Vec<f64> = (len - period..len)
        .map(|i| (highs[i] + lows[i] + closes[i]) / 3.0)
        .collect();
    let mean = typical.iter().sum::<f64>() / period as f64;
    let mean_dev = typical.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;

    if mean_dev == 0.0 {
        return Reading::Computed(0.0);
    }
    let last = typical[period - 1];
    Reading::Computed((last - mean) / (0.015 * mean_dev))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 10.0 + i as f64).collect()
    }

    #[test]
    fn test_rsi_needs_period_plus_one() {
        let closes = rising(14);
        assert_eq!(rsi(&closes, 14), Reading::Neutral(50.0));

        let closes = rising(15);
        assert_eq!(rsi(&closes, 14), Reading::Computed(100.0));
    }

    #[test]
    fn test_rsi_flat_series_is_neutral_value() {
        let closes = vec![10.0; 30];
        assert_eq!(rsi(&closes, 14).value(), 50.0);
    }

    #[test]
    fn test_rsi_falling_series_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&closes, 14).value() < 0.001);
    }

    #[test]
    fn test_rsi_history_length() {
        let closes = rising(40);
        assert_eq!(rsi_history(&closes, 14, 10).len(), 10);
        assert_eq!(rsi_history(&closes[..18], 14, 10).len(), 4);
        assert!(rsi_history(&closes[..10], 14, 10).is_empty());
    }

    #[test]
    fn test_stochastic_at_top_of_range() {
        let closes = rising(20);
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.5).collect();

        let k = stochastic_k(&highs, &lows, &closes, 14);
        assert!(k.is_computed());
        assert!(k.value() > 90.0);

        let d = stochastic_d(&highs, &lows, &closes, 14, 3);
        assert!(d.is_computed());
        assert_eq!(stochastic_d(&highs[..15], &lows[..15], &closes[..15], 14, 3), Reading::Neutral(50.0));
    }

    #[test]
    fn test_williams_r_short_history() {
        let closes = rising(5);
        assert_eq!(williams_r(&closes, &closes, &closes, 14), Reading::Neutral(-50.0));
    }

    #[test]
    fn test_change_pct() {
        let closes = vec![100.0, 105.0, 110.0];
        assert!((change_pct(&closes, 1).value() - 4.7619).abs() < 0.001);
        assert!((change_pct(&closes, 2).value() - 10.0).abs() < 0.001);
        assert_eq!(change_pct(&closes, 3), Reading::Neutral(0.0));
        assert_eq!(rate_of_change(&rising(10), 10), Reading::Neutral(0.0));
        assert!(rate_of_change(&rising(11), 10).is_computed());
    }

    #[test]
    fn test_cci_flat_and_short() {
        let flat = vec![10.0; 25];
        assert_eq!(cci(&flat, &flat, &flat, 20), Reading::Computed(0.0));
        assert_eq!(cci(&flat[..19], &flat[..19], &flat[..19], 20), Reading::Neutral(0.0));
    }

    fn ohlc_strategy() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, Vec<f64>)> {
        prop::collection::vec((1.0f64..1000.0, 0.0f64..50.0, 0.0f64..1.0), 1..80).prop_map(|rows| {
            let mut highs = Vec::with_capacity(rows.len());
            let mut lows = Vec::with_capacity(rows.len());
            let mut closes = Vec::with_capacity(rows.len());
            for (low, span, frac) in rows {
                lows.push(low);
                highs.push(low + span);
                closes.push(low + span * frac);
            }
            (highs, lows, closes)
        })
    }

    proptest! {
        #[test]
        fn prop_rsi_bounded(closes in prop::collection::vec(0.01f64..10_000.0, 0..120)) {
            for period in [7usize, 14, 21] {
                let v = rsi(&closes, period).value();
                prop_assert!((0.0..=100.0).contains(&v));
            }
        }

        #[test]
        fn prop_oscillators_bounded((highs, lows, closes) in ohlc_strategy()) {
            let k = stochastic_k(&highs, &lows, &closes, 14).value();
            let d = stochastic_d(&highs, &lows, &closes, 14, 3).value();
            let w = williams_r(&highs, &lows, &closes, 14).value();
            prop_assert!((0.0..=100.0).contains(&k));
            prop_assert!((0.0..=100.0).contains(&d));
            prop_assert!((-100.0..=0.0).contains(&w));
        }
    }
}
