//! The four independent rule blocks of the signal scorer.
//!
//! Each block reads only its own inputs and returns a [`BlockScore`]
//! together with the measurements it was based on.

use serde::{Deserialize, Serialize};

use crate::data::CompanyProfile;

/// Score and human-readable signals of one rule block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockScore {
    pub score: f64,
    pub signals: Vec<String>,
}

impl BlockScore {
    fn add(&mut self, points: f64, signal: impl Into<String>) {
        self.score += points;
        self.signals.push(signal.into());
    }
}

// ============================================================================
// Volume Continuity
// ============================================================================

/// Bars inspected for sustained volume.
const CONTINUITY_WINDOW: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeContinuity {
    pub block: BlockScore,
    pub current_ratio: f64,
    pub spike_days: usize,
    pub baseline: f64,
}

/// Score the current volume ratio and how many recent days were spikes.
pub fn volume_continuity(volumes: &[f64]) -> VolumeContinuity {
    let len = volumes.len();
    if len < CONTINUITY_WINDOW {
        return VolumeContinuity {
            block: BlockScore {
                score: 0.0,
                signals: vec!["insufficient volume history".to_string()],
            },
            current_ratio: 0.0,
            spike_days: 0,
            baseline: 0.0,
        };
    }

    let base = if len > 2 * CONTINUITY_WINDOW {
        &volumes[..len - CONTINUITY_WINDOW]
    } else {
        &volumes[..len - 1]
    };
    let baseline = base.iter().sum::<f64>() / base.len() as f64;

    let ratio = |v: f64| if baseline > 0.0 { v / baseline } else { 0.0 };
    let current_ratio = ratio(volumes[len - 1]);
    let spike_days = volumes[len - CONTINUITY_WINDOW..]
        .iter()
        .filter(|v| ratio(**v) >= 1.5)
        .count();

    let mut block = BlockScore::default();
    if current_ratio >= 3.0 {
        block.add(4.0, format!("super volume ({:.1}x)", current_ratio));
    } else if current_ratio >= 2.0 {
        block.add(3.0, format!("high volume ({:.1}x)", current_ratio));
    } else if current_ratio >= 1.5 {
        block.add(2.0, format!("elevated volume ({:.1}x)", current_ratio));
    } else if current_ratio < 0.5 {
        block.add(-3.0, format!("volume collapse ({:.1}x)", current_ratio));
    }

    if spike_days >= 5 {
        block.add(4.0, format!("excellent volume continuity ({}/7)", spike_days));
    } else if spike_days >= 3 {
        block.add(3.0, format!("strong volume continuity ({}/7)", spike_days));
    } else if spike_days >= 2 {
        block.add(1.0, format!("weak volume continuity ({}/7)", spike_days));
    } else {
        block.add(-1.0, format!("no volume continuity ({}/7)", spike_days));
    }

    VolumeContinuity {
        block,
        current_ratio,
        spike_days,
        baseline,
    }
}

// ============================================================================
// Momentum Classification
// ============================================================================

/// Momentum personality of the recent price action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumType {
    Machine,
    Strong,
    Medium,
    CleanUptrend,
    None,
}

impl MomentumType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Machine => "MOMENTUM_MACHINE",
            Self::Strong => "STRONG_MOMENTUM",
            Self::Medium => "MEDIUM_MOMENTUM",
            Self::CleanUptrend => "CLEAN_UPTREND",
            Self::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumClassification {
    pub block: BlockScore,
    pub momentum_type: MomentumType,
    pub big_move_days: usize,
    pub longest_run: usize,
}

fn pct_change(prev: f64, next: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (next - prev) / prev * 100.0
    }
}

/// Classify the last seven daily moves.
pub fn momentum_classification(closes: &[f64]) -> MomentumClassification {
    let len = closes.len();
    if len < CONTINUITY_WINDOW {
        return MomentumClassification {
            block: BlockScore {
                score: 0.0,
                signals: vec!["insufficient price history".to_string()],
            },
            momentum_type: MomentumType::None,
            big_move_days: 0,
            longest_run: 0,
        };
    }

    let start = len.saturating_sub(CONTINUITY_WINDOW + 1);
    let changes: Vec<f64> = closes[start..]
        .windows(2)
        .map(|w| pct_change(w[0], w[1]).abs())
        .collect();

    let mut big_move_days = 0;
    let mut run = 0;
    let mut longest_run = 0;
    for change in &changes {
        if *change >= 5.0 {
            big_move_days += 1;
            run += 1;
            longest_run = longest_run.max(run);
        } else {
            run = 0;
        }
    }

    let mut block = BlockScore::default();
    let momentum_type = if big_move_days >= 5 {
        block.add(5.0, format!("momentum machine ({}/7 big days)", big_move_days));
        if longest_run >= 3 {
            block.add(2.0, format!("sustained momentum ({} days in a row)", longest_run));
        }
        MomentumType::Machine
    } else if big_move_days >= 3 {
        block.add(3.0, format!("strong momentum ({}/7 big days)", big_move_days));
        MomentumType::Strong
    } else if big_move_days >= 2 {
        block.add(2.0, format!("medium momentum ({}/7 big days)", big_move_days));
        MomentumType::Medium
    } else {
        let mean = if changes.is_empty() {
            0.0
        } else {
            changes.iter().sum::<f64>() / changes.len() as f64
        };
        if mean > 1.0 && mean <= 3.0 {
            block.add(2.0, "clean uptrend (low volatility)");
            MomentumType::CleanUptrend
        } else {
            MomentumType::None
        }
    };

    let last_change = pct_change(closes[len - 2], closes[len - 1]);
    if last_change <= -5.0 {
        block.add(-2.0, format!("sharp drop on last day ({:.1}%)", last_change));
    }

    MomentumClassification {
        block,
        momentum_type,
        big_move_days,
        longest_run,
    }
}

// ============================================================================
// Company Size
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Mega,
    Large,
    Medium,
    SmallOk,
    TooSmall,
    Unknown,
}

impl SizeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mega => "MEGA",
            Self::Large => "LARGE",
            Self::Medium => "MEDIUM",
            Self::SmallOk => "SMALL_OK",
            Self::TooSmall => "TOO_SMALL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanySize {
    pub block: BlockScore,
    pub category: SizeCategory,
}

/// Score company size from market cap and head count.
///
/// A missing market cap scores 0 rather than the too-small penalty.
pub fn company_size(profile: &CompanyProfile) -> CompanySize {
    let mut block = BlockScore::default();

    let category = match profile.market_cap {
        None => {
            block.signals.push("market cap unknown".to_string());
            SizeCategory::Unknown
        }
        Some(cap) if cap >= 50e9 => {
            block.add(4.0, format!("mega company ({:.1}B)", cap / 1e9));
            SizeCategory::Mega
        }
        Some(cap) if cap >= 5e9 => {
            block.add(3.0, format!("large company ({:.1}B)", cap / 1e9));
            SizeCategory::Large
        }
        Some(cap) if cap >= 1e9 => {
            block.add(2.0, format!("medium company ({:.1}B)", cap / 1e9));
            SizeCategory::Medium
        }
        Some(cap) if cap >= 500e6 => {
            block.signals.push(format!("small but acceptable ({:.0}M)", cap / 1e6));
            SizeCategory::SmallOk
        }
        Some(cap) => {
            block.add(-3.0, format!("very small company risk ({:.0}M)", cap / 1e6));
            SizeCategory::TooSmall
        }
    };

    match profile.employees {
        Some(e) if e >= 1000 => block.add(2.0, format!("large organisation ({} employees)", e)),
        Some(e) if e >= 100 => block.add(1.0, format!("medium organisation ({} employees)", e)),
        Some(e) if e > 0 && e < 50 => {
            block.add(-2.0, format!("small organisation risk ({} employees)", e))
        }
        _ => {}
    }

    CompanySize { block, category }
}

// ============================================================================
// Technical Confirmation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalConfirmation {
    pub rsi: BlockScore,
    pub resistance: BlockScore,
    pub rsi_momentum: f64,
    pub resistance_proximity: f64,
}

/// RSI momentum and proximity of the previous close to recent highs.
pub fn technical_confirmation(
    rsi_history: &[f64],
    closes: &[f64],
    highs: &[f64],
) -> TechnicalConfirmation {
    let n = rsi_history.len();
    let rsi_momentum = if n >= 6 {
        rsi_history[n - 2] - rsi_history[n - 6]
    } else {
        0.0
    };

    let mut rsi = BlockScore::default();
    let rsi_points = if rsi_momentum >= 15.0 {
        3.0
    } else if rsi_momentum >= 10.0 {
        2.0
    } else if rsi_momentum >= 5.0 {
        1.0
    } else {
        0.0
    };
    if rsi_points > 0.0 {
        rsi.add(rsi_points, format!("RSI momentum +{:.1}", rsi_momentum));
    }

    let resistance_proximity = if closes.len() >= 2 && !highs.is_empty() {
        let window = &highs[highs.len().saturating_sub(20)..];
        let recent_high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if recent_high > 0.0 {
            closes[closes.len() - 2] / recent_high * 100.0
        } else {
            0.0
        }
    } else {
        0.0
    };

    let mut resistance = BlockScore::default();
    let resistance_points = if resistance_proximity >= 98.0 {
        3.0
    } else if resistance_proximity >= 95.0 {
        2.0
    } else if resistance_proximity >= 90.0 {
        1.0
    } else {
        0.0
    };
    if resistance_points > 0.0 {
        resistance.add(
            resistance_points,
            format!("near resistance ({:.1}%)", resistance_proximity),
        );
    }

    TechnicalConfirmation {
        rsi,
        resistance,
        rsi_momentum,
        resistance_proximity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_volume_continuity_short_history() {
        let result = volume_continuity(&[100.0; 6]);
        assert_eq!(result.block.score, 0.0);
        assert_eq!(result.block.signals, vec!["insufficient volume history"]);
    }

    #[test]
    fn test_volume_continuity_spike_run() {
        // 10 quiet bars, then 5 loud ones: baseline is mean(v[..len-7])
        let mut volumes = vec![100.0; 10];
        volumes.extend([400.0; 5]);
        let result = volume_continuity(&volumes);

        assert_eq!(result.spike_days, 5);
        assert!(result.current_ratio >= 2.0);
        assert!(result.block.score >= 7.0);
    }

    #[test]
    fn test_volume_continuity_single_final_spike() {
        let mut volumes = vec![1000.0; 19];
        volumes.push(4000.0);
        let result = volume_continuity(&volumes);

        assert!((result.current_ratio - 4.0).abs() < 1e-9);
        assert_eq!(result.spike_days, 1);
        // +4 super volume, -1 for a lone spike
        assert_eq!(result.block.score, 3.0);
        assert!(result.block.signals[0].starts_with("super volume"));
    }

    #[test]
    fn test_volume_continuity_collapse() {
        let mut volumes = vec![1000.0; 20];
        volumes.push(100.0);
        let result = volume_continuity(&volumes);

        // -3 for the collapse, -1 for no continuity
        assert_eq!(result.block.score, -4.0);
        assert_eq!(result.spike_days, 0);
    }

    #[test]
    fn test_volume_continuity_zero_baseline() {
        let mut volumes = vec![0.0; 10];
        volumes.push(500.0);
        let result = volume_continuity(&volumes);
        assert_eq!(result.current_ratio, 0.0);
        assert_eq!(result.spike_days, 0);
    }

    #[test]
    fn test_momentum_machine() {
        let mut closes = vec![10.0];
        for _ in 0..7 {
            let last = *closes.last().unwrap();
            closes.push(last * 1.08);
        }
        let result = momentum_classification(&closes);

        assert_eq!(result.momentum_type, MomentumType::Machine);
        assert_eq!(result.big_move_days, 7);
        assert_eq!(result.longest_run, 7);
        assert_eq!(result.block.score, 7.0);
    }

    #[test]
    fn test_momentum_clean_uptrend() {
        let mut closes = vec![10.0];
        for _ in 0..8 {
            let last = *closes.last().unwrap();
            closes.push(last * 1.02);
        }
        let result = momentum_classification(&closes);
        assert_eq!(result.momentum_type, MomentumType::CleanUptrend);
        assert_eq!(result.block.score, 2.0);
    }

    #[test]
    fn test_momentum_last_day_drop_penalty() {
        let closes = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 6.0];
        let result = momentum_classification(&closes);
        assert_eq!(result.momentum_type, MomentumType::None);
        assert_eq!(result.block.score, -2.0);
    }

    #[test]
    fn test_company_size_tiers() {
        let mut profile = CompanyProfile::unknown("X");
        let result = company_size(&profile);
        assert_eq!(result.category, SizeCategory::Unknown);
        assert_eq!(result.block.score, 0.0);

        profile.market_cap = Some(60e9);
        profile.employees = Some(5000);
        let result = company_size(&profile);
        assert_eq!(result.category, SizeCategory::Mega);
        assert_eq!(result.block.score, 6.0);

        profile.market_cap = Some(200e6);
        profile.employees = Some(6);
        let result = company_size(&profile);
        assert_eq!(result.category, SizeCategory::TooSmall);
        assert_eq!(result.block.score, -5.0);

        profile.market_cap = Some(700e6);
        profile.employees = Some(70);
        let result = company_size(&profile);
        assert_eq!(result.category, SizeCategory::SmallOk);
        assert_eq!(result.block.score, 0.0);
    }

    #[test]
    fn test_technical_confirmation() {
        let rsi = [40.0, 42.0, 45.0, 50.0, 55.0, 58.0, 60.0];
        let closes = [9.0, 9.9, 10.0];
        let highs = [10.0, 10.0, 10.1];
        let result = technical_confirmation(&rsi, &closes, &highs);

        // rsi[-2] - rsi[-6] = 58 - 42
        assert!((result.rsi_momentum - 16.0).abs() < 0.001);
        assert_eq!(result.rsi.score, 3.0);
        // 9.9 / 10.1
        assert!((result.resistance_proximity - 98.0198).abs() < 0.001);
        assert_eq!(result.resistance.score, 3.0);
    }

    #[test]
    fn test_technical_confirmation_short_history() {
        let result = technical_confirmation(&[50.0, 55.0], &[10.0], &[10.0]);
        assert_eq!(result.rsi_momentum, 0.0);
        assert_eq!(result.resistance_proximity, 0.0);
        assert_eq!(result.rsi.score + result.resistance.score, 0.0);
    }

    /// 20 quiet bars, `spikes` loud bars, then a final bar at `ratio`.
    fn volumes_with(spikes: usize, ratio: f64) -> Vec<f64> {
        let mut volumes = vec![100.0; 20];
        volumes.extend((0..6).map(|i| if i < spikes { 300.0 } else { 100.0 }));
        volumes.push(100.0 * ratio);
        volumes
    }

    proptest! {
        #[test]
        fn prop_volume_score_monotone_in_ratio(
            spikes in 0usize..=6,
            a in 0.0f64..1.49,
            b in 0.0f64..1.49,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let low = volume_continuity(&volumes_with(spikes, lo));
            let high = volume_continuity(&volumes_with(spikes, hi));
            prop_assert_eq!(low.spike_days, high.spike_days);
            prop_assert!(high.block.score >= low.block.score);
        }

        #[test]
        fn prop_volume_score_monotone_above_spike_level(
            spikes in 0usize..=6,
            a in 1.5f64..20.0,
            b in 1.5f64..20.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let low = volume_continuity(&volumes_with(spikes, lo));
            let high = volume_continuity(&volumes_with(spikes, hi));
            prop_assert_eq!(low.spike_days, spikes + 1);
            prop_assert_eq!(low.spike_days, high.spike_days);
            prop_assert!(high.block.score >= low.block.score);
        }
    }
}
