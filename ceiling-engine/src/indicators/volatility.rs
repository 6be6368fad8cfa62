//! Volatility indicators: Bollinger Bands, ATR and return volatility.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::Reading;

/// True range of a bar given the previous close.
pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Bollinger Bands with the close's position inside them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bollinger {
    pub upper: Reading,
    pub middle: Reading,
    pub lower: Reading,
    /// Position of the close between lower (0) and upper (100)
    pub position: Reading,
}

impl Bollinger {
    /// Position re-centred on the middle band, in [-1, 1].
    pub fn centred_position(&self) -> f64 {
        (self.position.value() - 50.0) / 50.0
    }
}

/// Bollinger(period, k) using the population standard deviation.
pub fn bollinger(closes: &[f64], period: usize, k: f64) -> Bollinger {
    let len = closes.len();
    let last = closes.last().copied().unwrap_or(0.0);
    if period == 0 || len < period {
        return Bollinger {
            upper: Reading::Neutral(last),
            middle: Reading::Neutral(last),
            lower: Reading::Neutral(last),
            position: Reading::Neutral(50.0),
        };
    }

    let window = &closes[len - period..];
    let middle = window.iter().mean();
    let std = window.iter().population_std_dev();
    let upper = middle + k * std;
    let lower = middle - k * std;

    let width = upper - lower;
    let position = if width > 0.0 {
        ((last - lower) / width * 100.0).clamp(0.0, 100.0)
    } else {
        50.0
    };

    Bollinger {
        upper: Reading::Computed(upper),
        middle: Reading::Computed(middle),
        lower: Reading::Computed(lower),
        position: Reading::Computed(position),
    }
}

/// Wilder ATR over `period`; needs `period + 1` bars.
///
/// With short history the last bar's range stands in.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Reading {
    let len = closes.len();
    if period == 0 || len < period + 1 || highs.len() != len || lows.len() != len {
        let fallback = match (highs.last(), lows.last()) {
            (Some(h), Some(l)) => h - l,
            _ => 0.0,
        };
        return Reading::Neutral(fallback);
    }

    let tr: Vec<f64> = (1..len)
        .map(|i| true_range(highs[i], lows[i], closes[i - 1]))
        .collect();

    let n = period as f64;
    let mut value = tr[..period].iter().sum::<f64>() / n;
    for t in &tr[period..] {
        value = (value * (n - 1.0) + t) / n;
    }
    Reading::Computed(value)
}

/// ATR as a percentage of the last close.
pub fn atr_pct(atr: Reading, last_close: f64) -> Reading {
    let pct = if last_close > 0.0 {
        atr.value() / last_close * 100.0
    } else {
        0.0
    };
    match atr {
        Reading::Computed(_) => Reading::Computed(pct),
        Reading::Neutral(_) => Reading::Neutral(pct),
    }
}

/// Neutral return volatility in percent.
pub const VOLATILITY_NEUTRAL: f64 = 5.0;

/// Sample standard deviation of daily percentage returns; needs 10 bars.
pub fn return_volatility(closes: &[f64]) -> Reading {
    if closes.len() < 10 {
        return Reading::Neutral(VOLATILITY_NEUTRAL);
    }

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    if returns.len() < 2 {
        return Reading::Neutral(VOLATILITY_NEUTRAL);
    }

    let std = returns.iter().std_dev();
    if std.is_finite() {
        Reading::Computed(std)
    } else {
        Reading::Neutral(VOLATILITY_NEUTRAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_true_range() {
        assert_eq!(true_range(12.0, 10.0, 11.0), 2.0);
        assert_eq!(true_range(12.0, 11.0, 9.0), 3.0);
        assert_eq!(true_range(10.0, 9.0, 13.0), 4.0);
    }

    #[test]
    fn test_bollinger_flat_series() {
        let closes = vec![10.0; 20];
        let bb = bollinger(&closes, 20, 2.0);
        assert_eq!(bb.middle, Reading::Computed(10.0));
        assert_eq!(bb.upper, Reading::Computed(10.0));
        assert_eq!(bb.position, Reading::Computed(50.0));
        assert!(bb.centred_position().abs() < 0.001);
    }

    #[test]
    fn test_bollinger_short_history() {
        let closes = vec![10.0, 11.0];
        let bb = bollinger(&closes, 20, 2.0);
        assert_eq!(bb.middle, Reading::Neutral(11.0));
        assert_eq!(bb.position, Reading::Neutral(50.0));
    }

    #[test]
    fn test_bollinger_population_std() {
        // mean 2.5, population variance 1.25
        let closes = [1.0, 2.0, 3.0, 4.0];
        let bb = bollinger(&closes, 4, 2.0);
        let expected = 2.5 + 2.0 * 1.25f64.sqrt();
        assert!((bb.upper.value() - expected).abs() < 0.001);
    }

    #[test]
    fn test_atr_fallback_is_last_range() {
        let highs = [11.0, 12.0];
        let lows = [9.0, 10.5];
        let closes = [10.0, 11.0];
        assert_eq!(atr(&highs, &lows, &closes, 14), Reading::Neutral(1.5));
    }

    #[test]
    fn test_atr_constant_range() {
        let closes = vec![10.0; 20];
        let highs = vec![11.0; 20];
        let lows = vec![9.0; 20];
        let value = atr(&highs, &lows, &closes, 14);
        assert!(value.is_computed());
        assert!((value.value() - 2.0).abs() < 0.001);
        assert!((atr_pct(value, 10.0).value() - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_return_volatility() {
        assert_eq!(return_volatility(&[1.0; 9]), Reading::Neutral(5.0));
        assert_eq!(return_volatility(&[1.0; 12]), Reading::Computed(0.0));

        let zigzag: Vec<f64> = (0..12).map(|i| if i % 2 == 0 { 100.0 } else { 110.0 }).collect();
        assert!(return_volatility(&zigzag).value() > 5.0);
    }

    proptest! {
        #[test]
        fn prop_bollinger_position_bounded(closes in prop::collection::vec(0.01f64..10_000.0, 0..60)) {
            let p = bollinger(&closes, 20, 2.0).position.value();
            prop_assert!((0.0..=100.0).contains(&p));
        }
    }
}
