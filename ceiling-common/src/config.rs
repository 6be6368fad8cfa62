//! Configuration management for the ceiling scanner.
//!
//! The scanner reads a single JSON file at `~/.ceiling/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (CEILING_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `CEILING_LOG_LEVEL` → observability.log_level
//! - `CEILING_LOG_FORMAT` → observability.log_format
//! - `CEILING_PRESET` → scan.preset
//! - `CEILING_UNIVERSE` → scan.universe (comma-separated)
//! - `CEILING_MIN_SCORE` → scan.min_score
//! - `CEILING_MIN_PROBABILITY` → scan.min_probability
//! - `CEILING_MODEL_DIR` → model.dir
//! - `providers[].api_key_env` names the variable holding that provider's key

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ceiling"),
        |dirs| dirs.home_dir().join(".ceiling"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Scan thresholds, weights and universe
    #[serde(default)]
    pub scan: ScanSettings,

    /// Market data providers, in no particular order (priority decides)
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,

    /// Prediction model training and storage
    #[serde(default)]
    pub model: ModelSettings,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("CEILING_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("CEILING_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(preset) = std::env::var("CEILING_PRESET") {
            self.scan.preset = preset;
        }
        if let Ok(universe) = std::env::var("CEILING_UNIVERSE") {
            self.scan.universe = parse_symbol_list(&universe);
        }
        if let Ok(score) = std::env::var("CEILING_MIN_SCORE") {
            if let Ok(v) = score.parse() {
                self.scan.min_score = Some(v);
            }
        }
        if let Ok(prob) = std::env::var("CEILING_MIN_PROBABILITY") {
            if let Ok(v) = prob.parse() {
                self.scan.min_probability = v;
            }
        }
        if let Ok(dir) = std::env::var("CEILING_MODEL_DIR") {
            self.model.dir = Some(dir);
        }
    }

    /// Enabled providers only.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

/// Split a comma-separated symbol list, trimming and upper-casing entries.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Scan Settings
// ============================================================================

/// How scan entries are admitted into the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Weighted heuristic score only
    Score,
    /// Model probability only
    Predict,
    /// Either threshold admits an entry
    #[default]
    Combined,
}

/// Optional per-block weight overrides applied on top of a preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub momentum: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub resistance: Option<f64>,
}

/// Scan configuration: universe, scorer personality and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Symbol universe, scanned in this order
    #[serde(default)]
    pub universe: Vec<String>,

    /// Named scorer preset ("momentum_v2", "volume_revolution")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Per-block weight overrides
    #[serde(default)]
    pub weights: Option<WeightOverrides>,

    /// Risk tier breakpoints, highest first (four values)
    #[serde(default)]
    pub risk_breakpoints: Option<Vec<f64>>,

    /// Minimum weighted score (defaults to the preset's)
    #[serde(default)]
    pub min_score: Option<f64>,

    /// Minimum model probability
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,

    /// Report admission mode
    #[serde(default)]
    pub mode: ScanMode,

    /// Concurrent fetch workers
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Daily bars requested per symbol
    #[serde(default = "default_bars_limit")]
    pub bars_limit: usize,

    /// Maximum entries kept in the report
    #[serde(default = "default_report_limit")]
    pub report_limit: usize,

    /// Broad market index used for market context (e.g., "XU100")
    #[serde(default)]
    pub index_symbol: Option<String>,

    /// Market sentiment in [0, 1] supplied by the news collaborator
    #[serde(default = "default_sentiment")]
    pub sentiment: f64,

    /// Symbols treated as large caps by the heuristic
    #[serde(default)]
    pub large_caps: Vec<String>,

    /// Symbols in the curated speculative set
    #[serde(default)]
    pub speculative: Vec<String>,

    /// Market cap at or above which a symbol counts as large
    #[serde(default = "default_large_cap_threshold")]
    pub large_cap_threshold: f64,

    /// Probability penalty applied when the index is falling
    #[serde(default = "default_market_penalty")]
    pub market_penalty: f64,

    /// Index daily change (%) below which the penalty applies
    #[serde(default = "default_market_drop_threshold")]
    pub market_drop_threshold: f64,

    /// Exclude symbols whose 1-day change (%) is below this
    #[serde(default = "default_max_drop_1d")]
    pub max_drop_1d: f64,

    /// Exclude symbols whose 5-day change (%) is below this
    #[serde(default = "default_max_drop_5d")]
    pub max_drop_5d: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            universe: Vec::new(),
            preset: default_preset(),
            weights: None,
            risk_breakpoints: None,
            min_score: None,
            min_probability: default_min_probability(),
            mode: ScanMode::default(),
            max_concurrency: default_max_concurrency(),
            bars_limit: default_bars_limit(),
            report_limit: default_report_limit(),
            index_symbol: None,
            sentiment: default_sentiment(),
            large_caps: Vec::new(),
            speculative: Vec::new(),
            large_cap_threshold: default_large_cap_threshold(),
            market_penalty: default_market_penalty(),
            market_drop_threshold: default_market_drop_threshold(),
            max_drop_1d: default_max_drop_1d(),
            max_drop_5d: default_max_drop_5d(),
        }
    }
}

fn default_preset() -> String {
    "momentum_v2".to_string()
}

fn default_min_probability() -> f64 {
    0.5
}

fn default_max_concurrency() -> usize {
    4
}

fn default_bars_limit() -> usize {
    60
}

fn default_report_limit() -> usize {
    20
}

fn default_sentiment() -> f64 {
    0.5
}

fn default_large_cap_threshold() -> f64 {
    50_000_000_000.0
}

fn default_market_penalty() -> f64 {
    0.2
}

fn default_market_drop_threshold() -> f64 {
    -1.0
}

fn default_max_drop_1d() -> f64 {
    -3.0
}

fn default_max_drop_5d() -> f64 {
    -8.0
}

// ============================================================================
// Provider Settings
// ============================================================================

/// Kind of market data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Twelve Data REST API
    TwelveData,
    /// Alpha Vantage REST API
    AlphaVantage,
    /// Local JSON snapshot file
    Snapshot,
}

impl ProviderKind {
    /// Documented free-tier limit as (calls, window seconds).
    pub fn default_rate_limit(&self) -> (u32, u64) {
        match self {
            Self::TwelveData => (8, 60),
            Self::AlphaVantage => (5, 60),
            Self::Snapshot => (10_000, 1),
        }
    }
}

/// One configured market data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Unique provider name used in logs and health tracking
    pub name: String,

    /// Provider implementation
    pub kind: ProviderKind,

    /// Priority (lower = tried first); falls back to the provider's own
    #[serde(default)]
    pub priority: Option<u8>,

    /// Whether the provider is used
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum calls per window (defaults to the kind's documented limit)
    #[serde(default)]
    pub max_calls: Option<u32>,

    /// Rate limit window length in seconds
    #[serde(default)]
    pub window_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Override for the API base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Inline API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Snapshot file path (snapshot providers only)
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

impl ProviderSettings {
    /// Resolve the API key, preferring the environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }

    /// Effective rate limit as (calls, window seconds).
    pub fn rate_limit(&self) -> (u32, u64) {
        let (calls, window) = self.kind.default_rate_limit();
        (
            self.max_calls.unwrap_or(calls),
            self.window_secs.unwrap_or(window),
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Model Settings
// ============================================================================

/// Prediction model training and storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Directory holding model artifacts (defaults to `~/.ceiling/models`)
    #[serde(default)]
    pub dir: Option<String>,

    /// Artifact name
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Minimum labeled samples required for training
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Next-day change (%) that counts as a ceiling event
    #[serde(default = "default_ceiling_threshold")]
    pub ceiling_threshold: f64,

    /// Bars of history required before a sample is emitted
    #[serde(default = "default_warmup_bars")]
    pub warmup_bars: usize,

    /// Blend weight of the bagging forest
    #[serde(default = "default_forest_weight")]
    pub forest_weight: f64,

    /// Blend weight of the boosting model
    #[serde(default = "default_boosting_weight")]
    pub boosting_weight: f64,

    /// Trees per ensemble member
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Seed for bootstrap sampling and the holdout split
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: None,
            name: default_model_name(),
            min_samples: default_min_samples(),
            ceiling_threshold: default_ceiling_threshold(),
            warmup_bars: default_warmup_bars(),
            forest_weight: default_forest_weight(),
            boosting_weight: default_boosting_weight(),
            n_trees: default_n_trees(),
            seed: default_seed(),
        }
    }
}

impl ModelSettings {
    /// Effective artifact directory.
    pub fn model_dir(&self) -> PathBuf {
        self.dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir().join("models"))
    }
}

fn default_model_name() -> String {
    "ceiling_ensemble".to_string()
}

fn default_min_samples() -> usize {
    50
}

fn default_ceiling_threshold() -> f64 {
    9.0
}

fn default_warmup_bars() -> usize {
    30
}

fn default_forest_weight() -> f64 {
    0.6
}

fn default_boosting_weight() -> f64 {
    0.4
}

fn default_n_trees() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

// ============================================================================
// Tests
// ============================================================================
