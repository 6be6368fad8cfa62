//! Volume indicators.

use super::Reading;

/// Last volume divided by the mean of up to `period` bars before it.
///
/// Needs `period` bars; a zero baseline is reported as neutral.
pub fn volume_ratio(volumes: &[f64], period: usize) -> Reading {
    let len = volumes.len();
    if period == 0 || len < period || len < 2 {
        return Reading::Neutral(1.0);
    }

    let start = (len - 1).saturating_sub(period);
    let baseline = &volumes[start..len - 1];
    let mean = baseline.iter().sum::<f64>() / baseline.len() as f64;
    if mean <= 0.0 {
        return Reading::Neutral(1.0);
    }
    Reading::Computed(volumes[len - 1] / mean)
}

/// Previous bar's volume against the mean of the two bars before the last.
pub fn volume_momentum(volumes: &[f64]) -> Reading {
    let len = volumes.len();
    if len < 3 {
        return Reading::Neutral(1.0);
    }

    let recent = volumes[len - 2];
    let mean = (volumes[len - 2] + volumes[len - 3]) / 2.0;
    if mean <= 0.0 {
        return Reading::Neutral(1.0);
    }
    Reading::Computed(recent / mean)
}

/// Cumulative on-balance volume.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Reading {
    if closes.len() < 2 || closes.len() != volumes.len() {
        return Reading::Neutral(0.0);
    }

    let total = closes
        .windows(2)
        .zip(&volumes[1..])
        .fold(0.0, |acc, (w, v)| {
            if w[1] > w[0] {
                acc + v
            } else if w[1] < w[0] {
                acc - v
            } else {
                acc
            }
        });
    Reading::Computed(total)
}
