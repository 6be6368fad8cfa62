//! Technical indicator library.
//!
//! Every indicator is a pure function over trailing bars. When history is
//! too short the result is a [`Reading::Neutral`] carrying the documented
//! default, so callers never see NaN and can still tell a real value from a
//! placeholder.
//!
//! [`IndicatorSet::compute`] bundles the full set for one series together
//! with the derived volume alerts, price patterns and the three composite
//! scores (momentum, ceiling potential, technical).

pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

use serde::{Deserialize, Serialize};

use crate::data::PriceSeries;

pub use trend::{Adx, Macd};
pub use volatility::Bollinger;

// ============================================================================
// Reading
// ============================================================================

/// Value of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reading {
    /// Computed from enough history
    Computed(f64),
    /// History too short; carries the neutral default
    Neutral(f64),
}

impl Reading {
    pub fn value(&self) -> f64 {
        match self {
            Self::Computed(v) | Self::Neutral(v) => *v,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

pub(crate) fn highest(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

pub(crate) fn lowest(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

// ============================================================================
// Derived Classifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeAlert {
    VolumeSpike,
    ExplosiveVolume,
    MomentumAcceleration,
}

/// Tier of the 20-bar volume ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSignal {
    Explosive,
    VeryHigh,
    High,
    AboveAverage,
    Normal,
    Low,
}

impl VolumeSignal {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 3.0 {
            Self::Explosive
        } else if ratio > 2.0 {
            Self::VeryHigh
        } else if ratio > 1.5 {
            Self::High
        } else if ratio > 1.2 {
            Self::AboveAverage
        } else if ratio > 0.8 {
            Self::Normal
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breakout {
    Upward,
    Downward,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gap {
    Up,
    Down,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportResistance {
    ResistanceBreak,
    SupportTest,
    Neutral,
}

/// Price patterns over the trailing bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patterns {
    pub breakout: Breakout,
    pub gap: Gap,
    pub support_resistance: SupportResistance,
    pub momentum_continuation: bool,
}

impl Patterns {
    /// Breakout 30, gap-up 20, resistance break 25.
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.breakout == Breakout::Upward {
            score += 30.0;
        }
        if self.gap == Gap::Up {
            score += 20.0;
        }
        if self.support_resistance == SupportResistance::ResistanceBreak {
            score += 25.0;
        }
        score
    }

    fn detect(series: &PriceSeries) -> Self {
        let bars = series.bars();
        let len = bars.len();
        let Some(last) = series.last() else {
            return Self {
                breakout: Breakout::None,
                gap: Gap::None,
                support_resistance: SupportResistance::Neutral,
                momentum_continuation: false,
            };
        };
        let close = last.close;

        // Five bars before the last one; the current bar is excluded
        let breakout = if len >= 6 {
            let prior = &bars[len - 6..len - 1];
            let high = prior.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let low = prior.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            if close > high * 1.02 {
                Breakout::Upward
            } else if close < low * 0.98 {
                Breakout::Downward
            } else {
                Breakout::None
            }
        } else {
            Breakout::None
        };

        let gap = if len >= 2 {
            let prev_close = bars[len - 2].close;
            if last.open > prev_close * 1.02 {
                Gap::Up
            } else if last.open < prev_close * 0.98 {
                Gap::Down
            } else {
                Gap::None
            }
        } else {
            Gap::None
        };

        let support_resistance = if len >= 10 {
            let recent = &bars[len - 10..];
            let high = recent.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let low = recent.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            if close > high * 0.99 {
                SupportResistance::ResistanceBreak
            } else if close < low * 1.01 {
                SupportResistance::SupportTest
            } else {
                SupportResistance::Neutral
            }
        } else {
            SupportResistance::Neutral
        };

        let momentum_continuation = len >= 3
            && bars[len - 3].close < bars[len - 2].close
            && bars[len - 2].close < close;

        Self {
            breakout,
            gap,
            support_resistance,
            momentum_continuation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiSignal {
    Overbought,
    Oversold,
    Bullish,
    Bearish,
    Neutral,
}

impl RsiSignal {
    pub fn classify(rsi: Reading) -> Self {
        match rsi {
            Reading::Neutral(_) => Self::Neutral,
            Reading::Computed(v) if v > 70.0 => Self::Overbought,
            Reading::Computed(v) if v < 30.0 => Self::Oversold,
            Reading::Computed(v) if v > 50.0 => Self::Bullish,
            Reading::Computed(_) => Self::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl MacdTrend {
    pub fn classify(macd: &Macd) -> Self {
        if !macd.is_complete() {
            Self::Neutral
        } else if macd.line.value() > macd.signal.value() {
            Self::Bullish
        } else {
            Self::Bearish
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StochasticSignal {
    Overbought,
    Oversold,
    Neutral,
}

impl StochasticSignal {
    pub fn classify(k: Reading) -> Self {
        match k {
            Reading::Computed(v) if v > 80.0 => Self::Overbought,
            Reading::Computed(v) if v < 20.0 => Self::Oversold,
            _ => Self::Neutral,
        }
    }
}

/// Price-level size class of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceClass {
    Micro,
    Small,
    Mid,
    Large,
}

impl PriceClass {
    pub fn from_price(price: f64) -> Self {
        if price < 5.0 {
            Self::Micro
        } else if price < 20.0 {
            Self::Small
        } else if price < 100.0 {
            Self::Mid
        } else {
            Self::Large
        }
    }

    pub fn is_small(&self) -> bool {
        matches!(self, Self::Micro | Self::Small)
    }
}

// ============================================================================
// Indicator Set
// ============================================================================

/// Every indicator for one series, evaluated at its last bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub bars: usize,
    pub last_close: f64,

    pub rsi_7: Reading,
    pub rsi_14: Reading,
    pub rsi_21: Reading,
    /// Last 10 RSI(14) values, oldest first
    pub rsi_history: Vec<f64>,
    pub stochastic_k: Reading,
    pub stochastic_d: Reading,
    pub williams_r: Reading,
    pub roc_10: Reading,
    pub cci_20: Reading,

    pub sma_5: Reading,
    pub sma_10: Reading,
    pub sma_20: Reading,
    pub sma_50: Reading,
    pub ema_5: Reading,
    pub ema_10: Reading,
    pub ema_12: Reading,
    pub ema_20: Reading,
    pub ema_26: Reading,
    pub ema_50: Reading,
    pub macd: Macd,
    pub adx: Adx,

    pub bollinger: Bollinger,
    pub atr: Reading,
    pub atr_pct: Reading,
    pub volatility: Reading,

    pub volume_ratio_20: Reading,
    pub volume_ratio_5: Reading,
    pub volume_momentum: Reading,
    pub obv: Reading,

    pub change_1d: Reading,
    pub change_2d: Reading,
    pub momentum_5d: Reading,
    pub momentum_10d: Reading,
    pub momentum_20d: Reading,

    pub volume_alerts: Vec<VolumeAlert>,
    pub volume_signal: VolumeSignal,
    pub patterns: Patterns,
    pub rsi_signal: RsiSignal,
    pub macd_trend: MacdTrend,
    pub stochastic_signal: StochasticSignal,
    pub price_class: PriceClass,

    pub momentum_score: f64,
    pub ceiling_score: f64,
    pub technical_score: f64,
}

impl IndicatorSet {
    /// Compute the full set. Total: short or empty series yield neutral
    /// readings rather than errors.
    pub fn compute(series: &PriceSeries) -> Self {
        let closes = series.closes();
        let highs = series.highs();
        let lows = series.lows();
        let volumes = series.volumes();
        let last_close = closes.last().copied().unwrap_or(0.0);

        let rsi_14 = momentum::rsi(&closes, 14);
        let macd = trend::macd(&closes);
        let atr = volatility::atr(&highs, &lows, &closes, 14);
        let stochastic_k = momentum::stochastic_k(&highs, &lows, &closes, 14);

        let volume_ratio_20 = volume::volume_ratio(&volumes, 20);
        let volume_ratio_5 = volume::volume_ratio(&volumes, 5);
        let volume_momentum = volume::volume_momentum(&volumes);

        let mut set = Self {
            bars: closes.len(),
            last_close,

            rsi_7: momentum::rsi(&closes, 7),
            rsi_14,
            rsi_21: momentum::rsi(&closes, 21),
            rsi_history: momentum::rsi_history(&closes, 14, 10),
            stochastic_k,
            stochastic_d: momentum::stochastic_d(&highs, &lows, &closes, 14, 3),
            williams_r: momentum::williams_r(&highs, &lows, &closes, 14),
            roc_10: momentum::rate_of_change(&closes, 10),
            cci_20: momentum::cci(&highs, &lows, &closes, 20),

            sma_5: trend::sma(&closes, 5),
            sma_10: trend::sma(&closes, 10),
            sma_20: trend::sma(&closes, 20),
            sma_50: trend::sma(&closes, 50),
            ema_5: trend::ema(&closes, 5),
            ema_10: trend::ema(&closes, 10),
            ema_12: trend::ema(&closes, 12),
            ema_20: trend::ema(&closes, 20),
            ema_26: trend::ema(&closes, 26),
            ema_50: trend::ema(&closes, 50),
            macd,
            adx: trend::adx(&highs, &lows, &closes, 14),

            bollinger: volatility::bollinger(&closes, 20, 2.0),
            atr,
            atr_pct: volatility::atr_pct(atr, last_close),
            volatility: volatility::return_volatility(&closes),

            volume_ratio_20,
            volume_ratio_5,
            volume_momentum,
            obv: volume::obv(&closes, &volumes),

            change_1d: momentum::change_pct(&closes, 1),
            change_2d: momentum::change_pct(&closes, 2),
            momentum_5d: momentum::change_pct(&closes, 5),
            momentum_10d: momentum::change_pct(&closes, 10),
            momentum_20d: momentum::change_pct(&closes, 20),

            volume_alerts: Vec::new(),
            volume_signal: VolumeSignal::from_ratio(volume_ratio_20.value()),
            patterns: Patterns::detect(series),
            rsi_signal: RsiSignal::classify(rsi_14),
            macd_trend: MacdTrend::classify(&macd),
            stochastic_signal: StochasticSignal::classify(stochastic_k),
            price_class: PriceClass::from_price(last_close),

            momentum_score: 0.0,
            ceiling_score: 0.0,
            technical_score: 0.0,
        };

        set.volume_alerts = set.detect_volume_alerts();
        set.momentum_score = set.compute_momentum_score();
        set.ceiling_score = set.compute_ceiling_score();
        set.technical_score = set.compute_technical_score();
        set
    }

    pub fn has_alert(&self, alert: VolumeAlert) -> bool {
        self.volume_alerts.contains(&alert)
    }

    /// Breakout 30 + gap-up 20 + resistance break 25.
    pub fn pattern_score(&self) -> f64 {
        self.patterns.score()
    }

    fn detect_volume_alerts(&self) -> Vec<VolumeAlert> {
        let ratio_20 = self.volume_ratio_20.value();
        let ratio_5 = self.volume_ratio_5.value();

        let mut alerts = Vec::new();
        if ratio_20 > 2.0 || ratio_5 > 1.8 {
            alerts.push(VolumeAlert::VolumeSpike);
        }
        if ratio_20 > 2.5 {
            alerts.push(VolumeAlert::ExplosiveVolume);
        }
        if self.volume_momentum.value() > 1.8 {
            alerts.push(VolumeAlert::MomentumAcceleration);
        }
        alerts
    }

    fn compute_momentum_score(&self) -> f64 {
        let mut score = 0.0;
        if self.patterns.momentum_continuation {
            score += 20.0;
        }
        if self.momentum_5d.value() > 5.0 {
            score += 15.0;
        }
        if self.momentum_10d.value() > 10.0 {
            score += 10.0;
        }
        if self.change_1d.value() > 3.0 {
            score += 10.0;
        }
        score
    }

    fn compute_ceiling_score(&self) -> f64 {
        let mut score: f64 = match self.volume_signal {
            VolumeSignal::Explosive => 40.0,
            VolumeSignal::VeryHigh => 30.0,
            VolumeSignal::High => 20.0,
            _ => 0.0,
        };

        if self.has_alert(VolumeAlert::VolumeSpike) {
            score += 15.0;
        }
        if self.has_alert(VolumeAlert::ExplosiveVolume) {
            score += 10.0;
        }

        if self.patterns.momentum_continuation {
            score += 15.0;
        }
        if self.momentum_5d.value() > 5.0 {
            score += 10.0;
        }

        if self.patterns.breakout == Breakout::Upward {
            score += 15.0;
        }
        if self.patterns.gap == Gap::Up {
            score += 10.0;
        }
        if self.patterns.support_resistance == SupportResistance::ResistanceBreak {
            score += 10.0;
        }

        if self.price_class.is_small() {
            score += 10.0;
        }
        if self.volatility.value() > 8.0 {
            score += 5.0;
        }

        score.min(100.0)
    }

    fn compute_technical_score(&self) -> f64 {
        let mut score: f64 = 40.0;

        score += match self.rsi_signal {
            RsiSignal::Oversold => 20.0,
            RsiSignal::Bullish => 12.0,
            RsiSignal::Overbought => -15.0,
            RsiSignal::Bearish => -8.0,
            RsiSignal::Neutral => 0.0,
        };

        score += match self.macd_trend {
            MacdTrend::Bullish => 12.0,
            MacdTrend::Bearish => -12.0,
            MacdTrend::Neutral => 0.0,
        };

        score += match self.volume_signal {
            VolumeSignal::Explosive => 25.0,
            VolumeSignal::VeryHigh => 18.0,
            VolumeSignal::High => 12.0,
            VolumeSignal::AboveAverage => 6.0,
            VolumeSignal::Normal => 0.0,
            VolumeSignal::Low => -10.0,
        };

        for alert in &self.volume_alerts {
            score += match alert {
                VolumeAlert::VolumeSpike => 15.0,
                VolumeAlert::ExplosiveVolume => 20.0,
                VolumeAlert::MomentumAcceleration => 12.0,
            };
        }

        if self.patterns.momentum_continuation {
            score += 15.0;
        }

        score += match self.stochastic_signal {
            StochasticSignal::Oversold => 12.0,
            StochasticSignal::Overbought => -12.0,
            StochasticSignal::Neutral => 0.0,
        };

        let m5 = self.momentum_5d.value();
        if m5 > 10.0 {
            score += 10.0;
        } else if m5 > 5.0 {
            score += 5.0;
        }

        let m20 = self.momentum_20d.value();
        if m20 > 20.0 {
            score += 8.0;
        } else if m20 > 10.0 {
            score += 4.0;
        }

        score.clamp(0.0, 100.0)
    }

    /// Named latest values for reporting.
    pub fn readings(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("close", self.last_close),
            ("rsi_7", self.rsi_7.value()),
            ("rsi_14", self.rsi_14.value()),
            ("rsi_21", self.rsi_21.value()),
            ("stochastic_k", self.stochastic_k.value()),
            ("stochastic_d", self.stochastic_d.value()),
            ("williams_r", self.williams_r.value()),
            ("roc_10", self.roc_10.value()),
            ("cci_20", self.cci_20.value()),
            ("sma_5", self.sma_5.value()),
            ("sma_10", self.sma_10.value()),
            ("sma_20", self.sma_20.value()),
            ("sma_50", self.sma_50.value()),
            ("ema_5", self.ema_5.value()),
            ("ema_10", self.ema_10.value()),
            ("ema_12", self.ema_12.value()),
            ("ema_20", self.ema_20.value()),
            ("ema_26", self.ema_26.value()),
            ("ema_50", self.ema_50.value()),
            ("macd", self.macd.line.value()),
            ("macd_signal", self.macd.signal.value()),
            ("macd_histogram", self.macd.histogram.value()),
            ("adx", self.adx.adx.value()),
            ("plus_di", self.adx.plus_di.value()),
            ("minus_di", self.adx.minus_di.value()),
            ("bb_upper", self.bollinger.upper.value()),
            ("bb_middle", self.bollinger.middle.value()),
            ("bb_lower", self.bollinger.lower.value()),
            ("bb_position", self.bollinger.position.value()),
            ("atr", self.atr.value()),
            ("atr_pct", self.atr_pct.value()),
            ("volatility", self.volatility.value()),
            ("volume_ratio_20", self.volume_ratio_20.value()),
            ("volume_ratio_5", self.volume_ratio_5.value()),
            ("volume_momentum", self.volume_momentum.value()),
            ("obv", self.obv.value()),
            ("change_1d", self.change_1d.value()),
            ("change_2d", self.change_2d.value()),
            ("momentum_5d", self.momentum_5d.value()),
            ("momentum_10d", self.momentum_10d.value()),
            ("momentum_20d", self.momentum_20d.value()),
            ("momentum_score", self.momentum_score),
            ("ceiling_score", self.ceiling_score),
            ("technical_score", self.technical_score),
        ]
    }
}
