//! Scorer configuration: named presets, block weights and risk breakpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use ceiling_common::{ScanSettings, WeightOverrides};

use super::ScorerError;

// ============================================================================
// Block Weights
// ============================================================================

/// Weight of each rule block in the total score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockWeights {
    pub volume: f64,
    pub momentum: f64,
    pub size: f64,
    pub rsi: f64,
    pub resistance: f64,
}

impl BlockWeights {
    /// Apply per-block overrides on top of these weights.
    pub fn with_overrides(mut self, overrides: &WeightOverrides) -> Self {
        if let Some(v) = overrides.volume {
            self.volume = v;
        }
        if let Some(v) = overrides.momentum {
            self.momentum = v;
        }
        if let Some(v) = overrides.size {
            self.size = v;
        }
        if let Some(v) = overrides.rsi {
            self.rsi = v;
        }
        if let Some(v) = overrides.resistance {
            self.resistance = v;
        }
        self
    }

    fn as_array(&self) -> [f64; 5] {
        [self.volume, self.momentum, self.size, self.rsi, self.resistance]
    }
}

// ============================================================================
// Risk Breakpoints
// ============================================================================

/// Thresholds mapping the total score to a risk level, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakpoints {
    pub super_high: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl RiskBreakpoints {
    /// Build from four strictly descending values.
    pub fn from_slice(values: &[f64]) -> Result<Self, ScorerError> {
        let [super_high, high, medium, low] = values else {
            return Err(ScorerError::InvalidBreakpoints(format!(
                "expected 4 values, got {}",
                values.len()
            )));
        };
        if !(super_high > high && high > medium && medium > low) {
            return Err(ScorerError::InvalidBreakpoints(format!(
                "{:?} must be strictly descending",
                values
            )));
        }
        Ok(Self {
            super_high: *super_high,
            high: *high,
            medium: *medium,
            low: *low,
        })
    }
}

// ============================================================================
// Presets
// ============================================================================

/// Named scorer personality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerPreset {
    /// Volume and momentum led, company size weighted in
    #[default]
    MomentumV2,
    /// Heavier volume weight, no resistance block
    VolumeRevolution,
}

impl ScorerPreset {
    pub fn weights(&self) -> BlockWeights {
        match self {
            Self::MomentumV2 => BlockWeights {
                volume: 0.35,
                momentum: 0.30,
                size: 0.20,
                rsi: 0.10,
                resistance: 0.05,
            },
            Self::VolumeRevolution => BlockWeights {
                volume: 0.40,
                momentum: 0.30,
                size: 0.20,
                rsi: 0.10,
                resistance: 0.0,
            },
        }
    }

    pub fn breakpoints(&self) -> RiskBreakpoints {
        match self {
            Self::MomentumV2 => RiskBreakpoints {
                super_high: 8.0,
                high: 6.0,
                medium: 4.0,
                low: 2.0,
            },
            Self::VolumeRevolution => RiskBreakpoints {
                super_high: 7.0,
                high: 5.0,
                medium: 3.0,
                low: 1.5,
            },
        }
    }

    pub fn min_score(&self) -> f64 {
        match self {
            Self::MomentumV2 => 2.0,
            Self::VolumeRevolution => 1.5,
        }
    }
}

impl fmt::Display for ScorerPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MomentumV2 => write!(f, "momentum_v2"),
            Self::VolumeRevolution => write!(f, "volume_revolution"),
        }
    }
}

impl FromStr for ScorerPreset {
    type Err = ScorerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "momentum_v2" | "momentum" => Ok(Self::MomentumV2),
            "volume_revolution" | "volume" => Ok(Self::VolumeRevolution),
            other => Err(ScorerError::UnknownPreset(other.to_string())),
        }
    }
}

// ============================================================================
// Scorer Configuration
// ============================================================================

/// Effective scorer configuration after overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    pub preset: ScorerPreset,
    pub weights: BlockWeights,
    pub breakpoints: RiskBreakpoints,
    pub min_score: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::from_preset(ScorerPreset::default())
    }
}

impl ScorerConfig {
    pub fn from_preset(preset: ScorerPreset) -> Self {
        Self {
            preset,
            weights: preset.weights(),
            breakpoints: preset.breakpoints(),
            min_score: preset.min_score(),
        }
    }

    /// Resolve the preset named in the scan settings and apply overrides.
    pub fn from_settings(settings: &ScanSettings) -> Result<Self, ScorerError> {
        let preset: ScorerPreset = settings.preset.parse()?;
        let mut config = Self::from_preset(preset);

        if let Some(overrides) = &settings.weights {
            config.weights = config.weights.with_overrides(overrides);
        }
        if let Some(values) = &settings.risk_breakpoints {
            config.breakpoints = RiskBreakpoints::from_slice(values)?;
        }
        if let Some(min_score) = settings.min_score {
            config.min_score = min_score;
        }

        config.check_weights()?;
        Ok(config)
    }

    pub fn with_weights(mut self, weights: BlockWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    fn check_weights(&self) -> Result<(), ScorerError> {
        if self
            .weights
            .as_array()
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(ScorerError::InvalidWeights(format!("{:?}", self.weights)));
        }
        Ok(())
    }
}
