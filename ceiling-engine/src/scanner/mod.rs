//! Universe scanning and reporting.
//!
//! Runs the indicator → scorer → predictor pipeline for every symbol of a
//! universe, filters by the configured thresholds, sorts best first and
//! buckets the result into risk tiers.
//!
//! # Usage
//!
//! ```ignore
//! use ceiling_engine::scanner::{RankedReport, ReportFormat, ScanConfig, ScanEngine};
//!
//! let engine = ScanEngine::new(router, scorer, predictor, ScanConfig::default());
//! let result = engine.run_scan(&universe, 0.6).await?;
//! println!("{}", RankedReport::from(result).render(ReportFormat::Markdown));
//! ```

pub mod config;
pub mod engine;
pub mod report;

pub use config::ScanConfig;
pub use engine::{ScanEngine, ScanEntry, ScanError, ScanResult, SkippedSymbol};
pub use report::{RankedReport, ReportFormat, RiskTier};
