//! Alpha Vantage API adapter.
//!
//! # Endpoints
//! - `TIME_SERIES_DAILY`: daily bars under the "Time Series (Daily)" key
//! - `OVERVIEW`: market capitalization, employees, sector
//!
//! # Rate Limits
//! - Free tier: 5 requests/minute. Throttled responses come back as
//!   HTTP 200 with a `Note` (or `Information`) field instead of data.
//!
//! Istanbul listings use the `.IST` suffix ("THYAO" becomes "THYAO.IST").

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{DataCapabilities, DataProvider, ProviderError};
use super::{Bar, CompanyProfile, PriceSeries};

/// Alpha Vantage API base URL
const ALPHA_VANTAGE_API_BASE: &str = "https://www.alphavantage.co";

/// Bars returned by `outputsize=compact`
const COMPACT_SIZE: usize = 100;

/// Default listing suffix
const DEFAULT_SUFFIX: &str = ".IST";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)", default)]
    series: Option<BTreeMap<String, DailyEntry>>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyEntry {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

#[derive(Debug, Default, Deserialize)]
struct OverviewResponse {
    #[serde(rename = "Symbol", default)]
    symbol: Option<String>,
    #[serde(rename = "MarketCapitalization", default)]
    market_cap: Option<String>,
    #[serde(rename = "FullTimeEmployees", default)]
    employees: Option<String>,
    #[serde(rename = "Sector", default)]
    sector: Option<String>,
    #[serde(rename = "Industry", default)]
    industry: Option<String>,
    #[serde(rename = "SharesOutstanding", default)]
    shares_outstanding: Option<String>,
    #[serde(rename = "Note", default)]
    note: Option<String>,
    #[serde(rename = "Information", default)]
    information: Option<String>,
    #[serde(rename = "Error Message", default)]
    error_message: Option<String>,
}

/// Check the soft-error fields Alpha Vantage returns with HTTP 200.
fn soft_error(
    note: Option<&str>,
    information: Option<&str>,
    error_message: Option<&str>,
) -> Option<ProviderError> {
    if let Some(msg) = error_message {
        return Some(ProviderError::DataNotAvailable(msg.to_string()));
    }
    if let Some(msg) = note.or(information) {
        warn!(message = %msg, "Alpha Vantage throttle notice");
        return Some(ProviderError::RateLimited {
            retry_after_secs: Some(60),
        });
    }
    None
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ProviderError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ProviderError::Malformed(format!("{} is not a number: {:?}", field, raw)))
}

/// Overview fields use "None" or "-" for missing values.
fn optional_number(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

// ============================================================================
// Alpha Vantage Provider
// ============================================================================

/// Alpha Vantage adapter for daily bars and company overviews.
pub struct AlphaVantageProvider {
    name: String,
    api_key: String,
    base_url: String,
    suffix: String,
    priority: u8,
    health_symbol: String,
    client: reqwest::Client,
}

impl AlphaVantageProvider {
    /// Create a new adapter with the default endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "alpha_vantage".to_string(),
            api_key: api_key.into(),
            base_url: ALPHA_VANTAGE_API_BASE.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            priority: 2,
            health_symbol: "THYAO".to_string(),
            client,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    fn api_symbol(&self, symbol: &str) -> String {
        if symbol.contains('.') {
            symbol.to_string()
        } else {
            format!("{}{}", symbol, self.suffix)
        }
    }

    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        function: &str,
        symbol: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/query", self.base_url);
        let api_symbol = self.api_symbol(symbol);
        debug!(provider = %self.name, function, symbol = %api_symbol, "Requesting Alpha Vantage");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("function", function),
                ("symbol", api_symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .query(extra)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))
    }

    fn parse_series(
        symbol: &str,
        entries: BTreeMap<String, DailyEntry>,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        // BTreeMap keys are ISO dates, so iteration is oldest first
        let skip = entries.len().saturating_sub(limit);
        let mut bars = Vec::with_capacity(entries.len() - skip);

        for (date, entry) in entries.into_iter().skip(skip) {
            let timestamp = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .ok_or_else(|| ProviderError::Malformed(format!("invalid date {:?}", date)))?;

            bars.push(Bar {
                timestamp,
                open: parse_number("open", &entry.open)?,
                high: parse_number("high", &entry.high)?,
                low: parse_number("low", &entry.low)?,
                close: parse_number("close", &entry.close)?,
                volume: parse_number("volume", &entry.volume)?,
            });
        }

        PriceSeries::new(symbol, bars).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

// ============================================================================
// DataProvider Implementation
// ============================================================================

#[async_trait]
impl DataProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> DataCapabilities {
        DataCapabilities {
            daily_bars: true,
            company_profiles: true,
            index_data: false,
            max_bars: None,
            rate_limit_rpm: Some(5),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.get_daily_bars(&self.health_symbol, 1).await.map(|_| ())
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        let output_size = if limit <= COMPACT_SIZE { "compact" } else { "full" };
        let response: DailyResponse = self
            .query("TIME_SERIES_DAILY", symbol, &[("outputsize", output_size)])
            .await?;

        if let Some(err) = soft_error(
            response.note.as_deref(),
            response.information.as_deref(),
            response.error_message.as_deref(),
        ) {
            return Err(err);
        }

        match response.series {
            Some(entries) if !entries.is_empty() => Self::parse_series(symbol, entries, limit),
            _ => Err(ProviderError::Malformed(format!(
                "missing \"Time Series (Daily)\" for {}",
                symbol
            ))),
        }
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        let response: OverviewResponse = self.query("OVERVIEW", symbol, &[]).await?;

        if let Some(err) = soft_error(
            response.note.as_deref(),
            response.information.as_deref(),
            response.error_message.as_deref(),
        ) {
            return Err(err);
        }

        // Unknown symbols come back as `{}`
        if response.symbol.is_none() {
            return Err(ProviderError::DataNotAvailable(format!(
                "no overview for {}",
                symbol
            )));
        }

        Ok(CompanyProfile {
            symbol: symbol.to_string(),
            market_cap: optional_number(response.market_cap.as_deref()),
            employees: optional_number(response.employees.as_deref()).map(|v| v as u64),
            sector: response.sector.filter(|s| !s.is_empty() && s != "None"),
            industry: response.industry.filter(|s| !s.is_empty() && s != "None"),
            shares_outstanding: optional_number(response.shares_outstanding.as_deref()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
