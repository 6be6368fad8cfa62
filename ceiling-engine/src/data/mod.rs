//! Market data for the ceiling scanner.
//!
//! Daily bar series, company profiles and market context, fetched from
//! multiple providers with automatic failover.
//!
//! # Data Sources
//! - **Twelve Data**: REST `/time_series`, free tier 8 calls/minute
//! - **Alpha Vantage**: `TIME_SERIES_DAILY`, free tier 5 calls/minute
//! - **In-memory / snapshot**: preloaded series for tests and offline runs

mod alpha_vantage;
mod batch;
mod health;
mod memory;
mod provider;
mod rate_limiter;
mod router;
mod twelve_data;

pub use alpha_vantage::AlphaVantageProvider;
pub use batch::{BatchConfig, BatchFetcher, FetchOutcome, SymbolData};
pub use health::{HealthMonitor, HealthMonitorConfig, Outcome, ProviderHealth, Standing};
pub use memory::{InMemoryProvider, Snapshot};
pub use provider::{DataCapabilities, DataProvider, ProviderError, ProviderInfo};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use router::{DataProviderRouter, ProviderRegistration, RouterConfig};
pub use twelve_data::TwelveDataProvider;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Core Data Types
// ============================================================================

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Session timestamp
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Absolute open-close distance.
    pub fn body_size(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Close above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Percentage change of this close versus a previous close.
    pub fn change_pct_from(&self, prev_close: f64) -> f64 {
        if prev_close == 0.0 {
            0.0
        } else {
            (self.close - prev_close) / prev_close * 100.0
        }
    }

    fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Violations rejected when building a [`PriceSeries`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("bar {index}: timestamps must be strictly increasing")]
    NonIncreasingTimestamp { index: usize },

    #[error("bar {index}: negative volume {volume}")]
    NegativeVolume { index: usize, volume: f64 },

    #[error("bar {index}: high/low do not bound open/close")]
    InconsistentRange { index: usize },

    #[error("bar {index}: non-finite value")]
    NonFinite { index: usize },
}

/// Chronologically ordered daily bars for one symbol.
///
/// Construction validates ordering and OHLC consistency, so every consumer
/// can rely on the invariants without re-checking them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a validated series.
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_finite() {
                return Err(SeriesError::NonFinite { index });
            }
            if bar.volume < 0.0 {
                return Err(SeriesError::NegativeVolume {
                    index,
                    volume: bar.volume,
                });
            }
            if bar.high < bar.low
                || bar.high < bar.open.max(bar.close)
                || bar.low > bar.open.min(bar.close)
            {
                return Err(SeriesError::InconsistentRange { index });
            }
            if index > 0 && bars[index - 1].timestamp >= bar.timestamp {
                return Err(SeriesError::NonIncreasingTimestamp { index });
            }
        }

        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Prefix ending at bar `n` inclusive.
    ///
    /// Training computes features on this view so nothing after bar `n`
    /// leaks into them.
    pub fn truncate_to(&self, n: usize) -> PriceSeries {
        let end = (n + 1).min(self.bars.len());
        PriceSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[..end].to_vec(),
        }
    }

    /// Keep only the most recent `limit` bars.
    pub fn tail(&self, limit: usize) -> PriceSeries {
        let start = self.bars.len().saturating_sub(limit);
        PriceSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[start..].to_vec(),
        }
    }
}

/// Company fundamentals used by the size-risk rules.
///
/// Missing values mean "unknown" and are never treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub employees: Option<u64>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
}

impl CompanyProfile {
    /// Profile with every field unknown.
    pub fn unknown(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }
}

/// Market-wide inputs shared by every symbol in a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// Broad index daily change in percent
    pub index_change_pct: f64,
    /// News sentiment in [0, 1]
    pub sentiment: f64,
}

impl MarketContext {
    pub fn new(index_change_pct: f64, sentiment: f64) -> Self {
        Self {
            index_change_pct,
            sentiment: sentiment.clamp(0.0, 1.0),
        }
    }
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            index_change_pct: 0.0,
            sentiment: 0.5,
        }
    }
}
