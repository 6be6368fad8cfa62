//! Multi-factor weighted signal scorer.
//!
//! Four independent rule blocks (volume continuity, momentum type, company
//! size, technical confirmation) are combined with preset weights into a
//! single total, which the risk breakpoints map to a [`RiskLevel`].
//!
//! ```text
//! total = w_volume * volume + w_momentum * momentum + w_size * size
//!       + w_rsi * rsi + w_resistance * resistance
//! ```

pub mod blocks;
pub mod config;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::data::CompanyProfile;
use crate::indicators::IndicatorSet;

pub use blocks::{BlockScore, MomentumType, SizeCategory};
pub use config::{BlockWeights, RiskBreakpoints, ScorerConfig, ScorerPreset};

/// Scorer configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ScorerError {
    #[error("Unknown scorer preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid risk breakpoints: {0}")]
    InvalidBreakpoints(String),

    #[error("Invalid block weights: {0}")]
    InvalidWeights(String),
}

// ============================================================================
// Risk Level
// ============================================================================

/// Risk tier of a weighted total score, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    SuperHigh,
    High,
    Medium,
    Low,
    Minimal,
}

impl RiskLevel {
    /// All levels, highest risk first.
    pub const ALL: [RiskLevel; 5] = [
        Self::SuperHigh,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Minimal,
    ];

    pub fn from_score(score: f64, breakpoints: &RiskBreakpoints) -> Self {
        if score >= breakpoints.super_high {
            Self::SuperHigh
        } else if score >= breakpoints.high {
            Self::High
        } else if score >= breakpoints.medium {
            Self::Medium
        } else if score >= breakpoints.low {
            Self::Low
        } else {
            Self::Minimal
        }
    }

    /// Ceiling probability label for the tier.
    pub fn probability_label(&self) -> &'static str {
        match self {
            Self::SuperHigh => ">= 90%",
            Self::High => ">= 80%",
            Self::Medium => "50-80%",
            Self::Low => "20-50%",
            Self::Minimal => "< 20%",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuperHigh => write!(f, "SUPER HIGH"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
            Self::Minimal => write!(f, "MINIMAL"),
        }
    }
}

// ============================================================================
// Input / Output
// ============================================================================

/// Everything the scorer reads for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct ScorerInput<'a> {
    pub symbol: &'a str,
    pub indicators: &'a IndicatorSet,
    pub volumes: &'a [f64],
    pub closes: &'a [f64],
    pub highs: &'a [f64],
    pub profile: &'a CompanyProfile,
}

/// Immutable result of scoring one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub symbol: String,
    pub price: f64,

    pub volume_score: f64,
    pub momentum_score: f64,
    pub size_score: f64,
    pub rsi_score: f64,
    pub resistance_score: f64,

    pub momentum_type: MomentumType,
    pub size_category: SizeCategory,
    pub current_volume_ratio: f64,
    pub spike_days: usize,
    pub rsi_momentum: f64,
    pub resistance_proximity: f64,

    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub signals: Vec<String>,
}

impl ScoreBreakdown {
    pub fn probability_label(&self) -> &'static str {
        self.risk_level.probability_label()
    }
}

// ============================================================================
// Signal Scorer
// ============================================================================

/// Weighted combination of the four rule blocks.
#[derive(Debug, Clone, Default)]
pub struct SignalScorer {
    config: ScorerConfig,
}

impl SignalScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn from_preset(preset: ScorerPreset) -> Self {
        Self::new(ScorerConfig::from_preset(preset))
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Minimum total score an entry needs to be reported.
    pub fn min_score(&self) -> f64 {
        self.config.min_score
    }

    pub fn score(&self, input: &ScorerInput<'_>) -> ScoreBreakdown {
        let volume = blocks::volume_continuity(input.volumes);
        let momentum = blocks::momentum_classification(input.closes);
        let size = blocks::company_size(input.profile);
        let technical = blocks::technical_confirmation(
            &input.indicators.rsi_history,
            input.closes,
            input.highs,
        );

        let w = &self.config.weights;
        let total_score = w.volume * volume.block.score
            + w.momentum * momentum.block.score
            + w.size * size.block.score
            + w.rsi * technical.rsi.score
            + w.resistance * technical.resistance.score;
        let risk_level = RiskLevel::from_score(total_score, &self.config.breakpoints);

        let signals: Vec<String> = [
            &volume.block,
            &momentum.block,
            &size.block,
            &technical.rsi,
            &technical.resistance,
        ]
        .into_iter()
        .flat_map(|b| b.signals.iter().cloned())
        .collect();

        ScoreBreakdown {
            symbol: input.symbol.to_string(),
            price: input.indicators.last_close,
            volume_score: volume.block.score,
            momentum_score: momentum.block.score,
            size_score: size.block.score,
            rsi_score: technical.rsi.score,
            resistance_score: technical.resistance.score,
            momentum_type: momentum.momentum_type,
            size_category: size.category,
            current_volume_ratio: volume.current_ratio,
            spike_days: volume.spike_days,
            rsi_momentum: technical.rsi_momentum,
            resistance_proximity: technical.resistance_proximity,
            total_score,
            risk_level,
            signals,
        }
    }
}
