//! In-memory provider backed by preloaded series and profiles.
//!
//! Serves offline runs from a JSON snapshot file and stands in for the
//! HTTP providers in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::provider::{DataCapabilities, DataProvider, ProviderError};
use super::{Bar, CompanyProfile, PriceSeries};

/// On-disk snapshot format.
///
/// ```json
/// {
///   "series":   { "THYAO": [ { "timestamp": "...", "open": 1.0, ... } ] },
///   "profiles": { "THYAO": { "symbol": "THYAO", "market_cap": 3.2e11 } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub series: HashMap<String, Vec<Bar>>,
    #[serde(default)]
    pub profiles: HashMap<String, CompanyProfile>,
}

impl Snapshot {
    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot from {}", path.display()))
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write snapshot to {}", path.display()))
    }
}

/// Provider serving preloaded data.
#[derive(Debug)]
pub struct InMemoryProvider {
    name: String,
    priority: u8,
    series: HashMap<String, PriceSeries>,
    profiles: HashMap<String, CompanyProfile>,
}

impl InMemoryProvider {
    pub fn new(name: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            priority,
            series: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    /// Build a provider from a snapshot, validating every series.
    pub fn from_snapshot(name: impl Into<String>, priority: u8, snapshot: Snapshot) -> Result<Self> {
        let mut provider = Self::new(name, priority);

        for (symbol, bars) in snapshot.series {
            let series = PriceSeries::new(symbol.clone(), bars)
                .with_context(|| format!("Invalid bars for {} in snapshot", symbol))?;
            provider.insert_series(series);
        }
        for (_, profile) in snapshot.profiles {
            provider.insert_profile(profile);
        }

        tracing::info!(
            provider = %provider.name,
            symbols = provider.series.len(),
            profiles = provider.profiles.len(),
            "Loaded snapshot provider"
        );
        Ok(provider)
    }

    /// Load a snapshot file and build a provider from it.
    pub fn from_snapshot_file(name: impl Into<String>, priority: u8, path: &Path) -> Result<Self> {
        Self::from_snapshot(name, priority, Snapshot::load(path)?)
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert_series(series);
        self
    }

    pub fn with_profile(mut self, profile: CompanyProfile) -> Self {
        self.insert_profile(profile);
        self
    }

    pub fn insert_series(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().to_uppercase(), series);
    }

    pub fn insert_profile(&mut self, profile: CompanyProfile) {
        self.profiles.insert(profile.symbol.to_uppercase(), profile);
    }

    /// Symbols with a stored series, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<_> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[async_trait]
impl DataProvider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> DataCapabilities {
        DataCapabilities::full()
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        self.series
            .get(&symbol.to_uppercase())
            .map(|s| s.tail(limit))
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no series for {}", symbol)))
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        self.profiles
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no profile for {}", symbol)))
    }
}
