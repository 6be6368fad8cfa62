//! Trend indicators: moving averages, MACD and ADX.

use serde::{Deserialize, Serialize};

use super::Reading;

/// Simple moving average of the last `period` values.
///
/// Neutral value is the last element (0 for an empty slice).
pub fn sma(values: &[f64], period: usize) -> Reading {
    let len = values.len();
    if period == 0 || len < period {
        return Reading::Neutral(values.last().copied().unwrap_or(0.0));
    }
    Reading::Computed(values[len - period..].iter().sum::<f64>() / period as f64)
}

/// EMA values from index `period - 1` onward, seeded with the SMA of the
/// first `period` values.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for v in &values[period..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Latest SMA-seeded EMA; neutral value is the last element.
pub fn ema(values: &[f64], period: usize) -> Reading {
    match ema_series(values, period).last() {
        Some(&v) => Reading::Computed(v),
        None => Reading::Neutral(values.last().copied().unwrap_or(0.0)),
    }
}

// ============================================================================
// MACD
// ============================================================================

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: Reading,
    pub signal: Reading,
    pub histogram: Reading,
}

impl Macd {
    fn neutral() -> Self {
        Self {
            line: Reading::Neutral(0.0),
            signal: Reading::Neutral(0.0),
            histogram: Reading::Neutral(0.0),
        }
    }

    /// True once the signal line exists.
    pub fn is_complete(&self) -> bool {
        self.signal.is_computed()
    }
}

/// MACD(12, 26, 9). The line needs 26 closes, signal and histogram 34.
pub fn macd(closes: &[f64]) -> Macd {
    let fast = ema_series(closes, MACD_FAST);
    let slow = ema_series(closes, MACD_SLOW);
    if slow.is_empty() {
        return Macd::neutral();
    }

    // fast starts at index 11, slow at 25
    let offset = MACD_SLOW - MACD_FAST;
    let line_series: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, s)| fast[i + offset] - s)
        .collect();

    let line = line_series[line_series.len() - 1];
    match ema_series(&line_series, MACD_SIGNAL).last() {
        Some(&signal) => Macd {
            line: Reading::Computed(line),
            signal: Reading::Computed(signal),
            histogram: Reading::Computed(line - signal),
        },
        None => Macd {
            line: Reading::Computed(line),
            signal: Reading::Neutral(0.0),
            histogram: Reading::Neutral(0.0),
        },
    }
}

// ============================================================================
// ADX
// ============================================================================

/// Average directional index with the directional indicators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adx {
    pub adx: Reading,
    pub plus_di: Reading,
    pub minus_di: Reading,
}

impl Adx {
    fn neutral() -> Self {
        Self {
            adx: Reading::Neutral(20.0),
            plus_di: Reading::Neutral(25.0),
            minus_di: Reading::Neutral(25.0),
        }
    }
}

/// Wilder ADX over `period`; needs `2 * period + 1` bars.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Adx {
    let len = closes.len();
    if period == 0 || len < 2 * period + 1 || highs.len() != len || lows.len() != len {
        return Adx::neutral();
    }

    let mut tr = Vec::with_capacity(len - 1);
    let mut plus_dm = Vec::with_capacity(len - 1);
    let mut minus_dm = Vec::with_capacity(len - 1);
    for i in 1..len {
        tr.push(super::volatility::true_range(highs[i], lows[i], closes[i - 1]));
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let n = period as f64;
    let mut s_tr: f64 = tr[..period].iter().sum();
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();

    let di = |dm: f64, tr: f64| if tr > 0.0 { 100.0 * dm / tr } else { 0.0 };
    let dx = |p: f64, m: f64| {
        if p + m > 0.0 {
            100.0 * (p - m).abs() / (p + m)
        } else {
            0.0
        }
    };

    let mut plus_di = di(s_plus, s_tr);
    let mut minus_di = di(s_minus, s_tr);
    let mut dxs = vec![dx(plus_di, minus_di)];

    for i in period..tr.len() {
        s_tr = s_tr - s_tr / n + tr[i];
        s_plus = s_plus - s_plus / n + plus_dm[i];
        s_minus = s_minus - s_minus / n + minus_dm[i];
        plus_di = di(s_plus, s_tr);
        minus_di = di(s_minus, s_tr);
        dxs.push(dx(plus_di, minus_di));
    }

    let mut adx = dxs[..period].iter().sum::<f64>() / n;
    for d in &dxs[period..] {
        adx = (adx * (n - 1.0) + d) / n;
    }

    Adx {
        adx: Reading::Computed(adx.clamp(0.0, 100.0)),
        plus_di: Reading::Computed(plus_di.clamp(0.0, 100.0)),
        minus_di: Reading::Computed(minus_di.clamp(0.0, 100.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_and_neutral() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&values, 5), Reading::Computed(3.0));
        assert_eq!(sma(&values, 2), Reading::Computed(4.5));
        assert_eq!(sma(&values, 10), Reading::Neutral(5.0));
        assert_eq!(sma(&[], 5), Reading::Neutral(0.0));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = [2.0, 4.0, 6.0];
        // seed = 4.0
        assert_eq!(ema(&values, 3), Reading::Computed(4.0));

        let values = [2.0, 4.0, 6.0, 8.0];
        // alpha = 0.5: 0.5 * 8 + 0.5 * 4
        assert!((ema(&values, 3).value() - 6.0).abs() < 0.001);
        assert_eq!(ema(&values[..2], 3), Reading::Neutral(4.0));
    }

    #[test]
    fn test_macd_minimum_bars() {
        let closes: Vec<f64> = (0..25).map(|i| 10.0 + i as f64 * 0.1).collect();
        assert!(!macd(&closes).line.is_computed());

        let closes: Vec<f64> = (0..26).map(|i| 10.0 + i as f64 * 0.1).collect();
        let m = macd(&closes);
        assert!(m.line.is_computed());
        assert!(!m.is_complete());

        let closes: Vec<f64> = (0..34).map(|i| 10.0 + i as f64 * 0.1).collect();
        let m = macd(&closes);
        assert!(m.is_complete());
        assert!(m.line.value() > 0.0);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let closes = vec![10.0; 40];
        let m = macd(&closes);
        assert!(m.line.value().abs() < 1e-9);
        assert!(m.histogram.value().abs() < 1e-9);
    }

    #[test]
    fn test_adx_neutral_and_trending() {
        let closes: Vec<f64> = (0..28).map(|i| 10.0 + i as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.5).collect();
        let a = adx(&highs, &lows, &closes, 14);
        assert_eq!(a.adx, Reading::Neutral(20.0));
        assert_eq!(a.plus_di, Reading::Neutral(25.0));

        let closes: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.5).collect();
        let a = adx(&highs, &lows, &closes, 14);
        assert!(a.adx.is_computed());
        assert!(a.plus_di.value() > a.minus_di.value());
        assert!(a.adx.value() > 50.0);
    }
}
