//! Twelve Data API adapter.
//!
//! # API Documentation
//! <https://twelvedata.com/docs#time-series>
//!
//! # Endpoints
//! - `/time_series?interval=1day`: daily bars, `values` newest first
//! - `/profile`: sector, industry and employee count
//!
//! # Rate Limits
//! - Free tier: 8 requests/minute, enforced by the router's limiter
//!
//! Exchange-local symbols are qualified with the exchange code
//! ("THYAO" becomes "THYAO:BIST"); symbols already containing `:` pass
//! through unchanged.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{DataCapabilities, DataProvider, ProviderError};
use super::{Bar, CompanyProfile, PriceSeries};

/// Twelve Data API base URL
const TWELVE_DATA_API_BASE: &str = "https://api.twelvedata.com";

/// Largest `outputsize` the API accepts
const MAX_OUTPUT_SIZE: usize = 5000;

/// Default exchange qualifier
const DEFAULT_EXCHANGE: &str = "BIST";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(default)]
    values: Option<Vec<TimeSeriesValue>>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesValue {
    datetime: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    employees: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

/// Map an in-body `{"status": "error"}` envelope to a provider error.
fn body_error(code: Option<u16>, message: Option<String>) -> ProviderError {
    let message = message.unwrap_or_else(|| "Unknown error".to_string());
    match code {
        Some(429) => ProviderError::RateLimited {
            retry_after_secs: Some(60),
        },
        Some(401) | Some(403) => ProviderError::Auth(message),
        Some(400) | Some(404) => ProviderError::DataNotAvailable(message),
        _ => ProviderError::Internal(message),
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ProviderError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ProviderError::Malformed(format!("{} is not a number: {:?}", field, raw)))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ProviderError::Malformed(format!("invalid datetime {:?}", raw)))
}

// ============================================================================
// Twelve Data Provider
// ============================================================================

/// Twelve Data adapter for daily bars and company profiles.
pub struct TwelveDataProvider {
    name: String,
    api_key: String,
    base_url: String,
    exchange: String,
    priority: u8,
    health_symbol: String,
    client: reqwest::Client,
}

impl TwelveDataProvider {
    /// Create a new adapter with the default endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: "twelve_data".to_string(),
            api_key: api_key.into(),
            base_url: TWELVE_DATA_API_BASE.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            priority: 1,
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

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Qualify a bare symbol with the exchange code.
    fn api_symbol(&self, symbol: &str) -> String {
        if symbol.contains(':') || self.exchange.is_empty() {
            symbol.to_string()
        } else {
            format!("{}:{}", symbol, self.exchange)
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(provider = %self.name, url = %url, "Requesting Twelve Data");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
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

    fn parse_values(
        &self,
        symbol: &str,
        values: Vec<TimeSeriesValue>,
    ) -> Result<PriceSeries, ProviderError> {
        let mut bars = Vec::with_capacity(values.len());

        // Newest first on the wire
        for value in values.into_iter().rev() {
            bars.push(Bar {
                timestamp: parse_datetime(&value.datetime)?,
                open: parse_number("open", &value.open)?,
                high: parse_number("high", &value.high)?,
                low: parse_number("low", &value.low)?,
                close: parse_number("close", &value.close)?,
                volume: match value.volume.as_deref() {
                    Some(raw) => parse_number("volume", raw)?,
                    None => 0.0,
                },
            });
        }

        PriceSeries::new(symbol, bars).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

// ============================================================================
// DataProvider Implementation
// ============================================================================

#[async_trait]
impl DataProvider for TwelveDataProvider {
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
            index_data: true,
            max_bars: Some(MAX_OUTPUT_SIZE),
            rate_limit_rpm: Some(8),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let series = self.get_daily_bars(&self.health_symbol, 1).await?;
        if series.is_empty() {
            return Err(ProviderError::Unavailable(
                "Health check returned no data".into(),
            ));
        }
        Ok(())
    }

    async fn get_daily_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<PriceSeries, ProviderError> {
        let params = [
            ("symbol", self.api_symbol(symbol)),
            ("interval", "1day".to_string()),
            ("outputsize", limit.clamp(1, MAX_OUTPUT_SIZE).to_string()),
        ];
        let response: TimeSeriesResponse = self.get_json("/time_series", &params).await?;

        if response.status.as_deref() == Some("error") {
            return Err(body_error(response.code, response.message));
        }

        let values = response.values.unwrap_or_default();
        if values.is_empty() {
            return Err(ProviderError::Malformed(format!(
                "empty values for {}",
                symbol
            )));
        }

        self.parse_values(symbol, values)
    }

    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        let params = [("symbol", self.api_symbol(symbol))];
        let response: ProfileResponse = self.get_json("/profile", &params).await?;

        if response.status.as_deref() == Some("error") {
            return Err(body_error(response.code, response.message));
        }

        Ok(CompanyProfile {
            symbol: symbol.to_string(),
            market_cap: None,
            employees: response.employees.filter(|e| *e > 0),
            sector: response.sector.filter(|s| !s.is_empty()),
            industry: response.industry.filter(|s| !s.is_empty()),
            shares_outstanding: None,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
