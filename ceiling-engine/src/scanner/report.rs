//! Report generation for scan results.
//!
//! Generates reports in two formats:
//! - Markdown (human-readable, grouped by risk tier)
//! - JSON (machine-readable)

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ceiling_common::ScanMode;

use super::engine::{ScanEntry, ScanResult, SkippedSymbol};
use crate::data::MarketContext;
use crate::scorer::RiskLevel;

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Markdown,
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

impl ReportFormat {
    fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }
}

// ============================================================================
// Ranked Report
// ============================================================================

/// Symbols of one risk tier, in report order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    pub level: RiskLevel,
    pub probability_label: String,
    pub symbols: Vec<String>,
}

/// Presentation view of a scan: sorted entries plus risk-tier buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedReport {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub mode: ScanMode,
    pub market: MarketContext,
    pub total_scanned: usize,
    pub skipped: Vec<SkippedSymbol>,
    pub entries: Vec<ScanEntry>,
    /// Non-empty tiers, highest risk first
    pub tiers: Vec<RiskTier>,
    pub duration_secs: f64,
}

impl From<ScanResult> for RankedReport {
    fn from(result: ScanResult) -> Self {
        let tiers = RiskLevel::ALL
            .iter()
            .filter_map(|level| {
                let symbols: Vec<String> = result
                    .entries
                    .iter()
                    .filter(|e| e.breakdown.risk_level == *level)
                    .map(|e| e.symbol().to_string())
                    .collect();
                (!symbols.is_empty()).then(|| RiskTier {
                    level: *level,
                    probability_label: level.probability_label().to_string(),
                    symbols,
                })
            })
            .collect();

        Self {
            id: result.id,
            generated_at: result.completed_at,
            mode: result.mode,
            market: result.market,
            total_scanned: result.total_scanned,
            skipped: result.skipped,
            entries: result.entries,
            tiers,
            duration_secs: result.duration_secs,
        }
    }
}

impl RankedReport {
    /// Render in the given format.
    pub fn render(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    /// Save the rendered report; a path without extension gets the
    /// format's extension.
    pub fn save_to_file(&self, path: &Path, format: ReportFormat) -> Result<PathBuf> {
        let file_path = if path.extension().is_none() {
            path.with_extension(format.extension())
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create report directory")?;
        }
        std::fs::write(&file_path, self.render(format)).context("Failed to write report file")?;

        Ok(file_path)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# Ceiling Scan Report\n\n**Scan ID**: {}\n**Generated**: {}\n**Duration**: {:.1}s\n\n",
            self.id,
            self.generated_at.format("%Y-%m-%d %H:%M:%S"),
            self.duration_secs
        ));

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Mode**: {:?}\n", self.mode));
        md.push_str(&format!("- **Scanned**: {} symbols\n", self.total_scanned));
        md.push_str(&format!("- **Candidates**: {}\n", self.entries.len()));
        md.push_str(&format!("- **Skipped**: {}\n", self.skipped.len()));
        md.push_str(&format!(
            "- **Market**: index {:+.2}%, sentiment {:.2}\n\n",
            self.market.index_change_pct, self.market.sentiment
        ));

        if self.entries.is_empty() {
            md.push_str("_No candidates met the thresholds._\n\n");
        } else {
            md.push_str("## Candidates\n\n");
            md.push_str("| # | Symbol | Price | Score | Risk | Probability | Source | Momentum | Vol Ratio | Size |\n");
            md.push_str("|---|--------|-------|-------|------|-------------|--------|----------|-----------|------|\n");
            for (rank, entry) in self.entries.iter().enumerate() {
                let b = &entry.breakdown;
                let (probability, source) = match &entry.prediction {
                    Some(p) => (format!("{:.0}%", p.probability * 100.0), p.source.to_string()),
                    None => ("-".to_string(), "-".to_string()),
                };
                md.push_str(&format!(
                    "| {} | {} | {:.2} | {:.2} | {} | {} | {} | {} | {:.1}x | {} |\n",
                    rank + 1,
                    b.symbol,
                    b.price,
                    b.total_score,
                    b.risk_level,
                    probability,
                    source,
                    b.momentum_type.label(),
                    b.current_volume_ratio,
                    b.size_category.label(),
                ));
            }
            md.push('\n');
        }

        if !self.tiers.is_empty() {
            md.push_str("## Risk Tiers\n\n");
            for tier in &self.tiers {
                md.push_str(&format!(
                    "### {} ({})\n\n{}\n\n",
                    tier.level,
                    tier.probability_label,
                    tier.symbols.join(", ")
                ));
            }
        }

        let prediction_signals = |e: &ScanEntry| -> Vec<String> {
            e.prediction
                .as_ref()
                .map(|p| p.contributing_signals.clone())
                .unwrap_or_default()
        };
        let with_signals: Vec<&ScanEntry> = self
            .entries
            .iter()
            .filter(|e| !e.breakdown.signals.is_empty() || !prediction_signals(e).is_empty())
            .take(10)
            .collect();
        if !with_signals.is_empty() {
            md.push_str("## Signals\n\n");
            for entry in with_signals {
                md.push_str(&format!("**{}**\n", entry.symbol()));
                for signal in &entry.breakdown.signals {
                    md.push_str(&format!("- {}\n", signal));
                }
                let drivers = prediction_signals(entry);
                if !drivers.is_empty() {
                    md.push_str(&format!("- Prediction: {}\n", drivers.join(", ")));
                }
                md.push('\n');
            }
        }

        if !self.skipped.is_empty() {
            md.push_str("## Skipped\n\n");
            for skip in &self.skipped {
                md.push_str(&format!("- {}: {}\n", skip.symbol, skip.reason));
            }
            md.push('\n');
        }

        md.push_str("---\n\n");
        md.push_str(&format!(
            "*Generated at {} UTC*\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PredictionResult, PredictionSource};
    use crate::scorer::{MomentumType, ScoreBreakdown, SizeCategory};
    use tempfile::TempDir;

    fn entry(symbol: &str, score: f64, risk_level: RiskLevel) -> ScanEntry {
        ScanEntry {
            breakdown: ScoreBreakdown {
                symbol: symbol.to_string(),
                price: 12.5,
                volume_score: 3.0,
                momentum_score: 2.0,
                size_score: 1.0,
                rsi_score: 0.0,
                resistance_score: 0.0,
                momentum_type: MomentumType::Strong,
                size_category: SizeCategory::SmallOk,
                current_volume_ratio: 2.4,
                spike_days: 2,
                rsi_momentum: 3.1,
                resistance_proximity: 97.0,
                total_score: score,
                risk_level,
                signals: vec!["Volume spike 2.4x".to_string()],
            },
            prediction: Some(PredictionResult {
                symbol: symbol.to_string(),
                probability: 0.72,
                contributing_signals: vec!["vol20 > 2.0 (+0.25)".to_string()],
                source: PredictionSource::Heuristic,
            }),
        }
    }

    fn result() -> ScanResult {
        let now = Utc::now();
        ScanResult {
            id: "scan_test".to_string(),
            trace_id: "trace".to_string(),
            mode: ScanMode::Combined,
            market: MarketContext::default(),
            entries: vec![
                entry("AAA", 8.5, RiskLevel::SuperHigh),
                entry("BBB", 6.1, RiskLevel::High),
                entry("CCC", 6.0, RiskLevel::High),
            ],
            skipped: vec![SkippedSymbol {
                symbol: "ZZZ".to_string(),
                reason: "no data".to_string(),
            }],
            total_scanned: 4,
            evaluated: 3,
            started_at: now,
            completed_at: now,
            duration_secs: 0.4,
        }
    }

    #[test]
    fn test_tiers_grouped_highest_first() {
        let report = RankedReport::from(result());
        assert_eq!(report.tiers.len(), 2);
        assert_eq!(report.tiers[0].level, RiskLevel::SuperHigh);
        assert_eq!(report.tiers[1].symbols, vec!["BBB", "CCC"]);
        assert_eq!(report.tiers[1].probability_label, ">= 80%");
    }

    #[test]
    fn test_markdown_contents() {
        let md = RankedReport::from(result()).to_markdown();
        assert!(md.contains("# Ceiling Scan Report"));
        assert!(md.contains("| 1 | AAA |"));
        assert!(md.contains("### SUPER HIGH (>= 90%)"));
        assert!(md.contains("- ZZZ: no data"));
        assert!(md.contains("72%"));
        assert!(md.contains("- Prediction: vol20 > 2.0 (+0.25)"));
    }

    #[test]
    fn test_json_is_parseable() {
        let json = RankedReport::from(result()).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_scanned"], 4);
        assert_eq!(value["entries"].as_array().unwrap().len(), 3);
        assert_eq!(value["tiers"][0]["level"], "super_high");
        assert_eq!(
            value["entries"][0]["prediction"]["contributing_signals"][0],
            "vol20 > 2.0 (+0.25)"
        );
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_save_adds_extension() {
        let dir = TempDir::new().unwrap();
        let report = RankedReport::from(result());
        let path = report
            .save_to_file(&dir.path().join("reports/today"), ReportFormat::Json)
            .unwrap();
        assert!(path.ends_with("reports/today.json"));
        assert!(path.exists());
    }
}
