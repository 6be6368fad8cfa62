//! Data provider abstraction for multi-source market data.
//!
//! Defines the `DataProvider` trait that all data sources implement,
//! enabling automatic failover and health-based routing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CompanyProfile, PriceSeries};

// ============================================================================
// Provider Capabilities
// ============================================================================

/// Capabilities supported by a data provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataCapabilities {
    /// Serves daily bars
    pub daily_bars: bool,
    /// Serves company profiles (market cap, employees)
    pub company_profiles: bool,
    /// Serves index series
    pub index_data: bool,
    /// Maximum bars returned per request
    pub max_bars: Option<usize>,
    /// Documented rate limit (requests per minute)
    pub rate_limit_rpm: Option<u32>,
}

impl DataCapabilities {
    /// Capabilities of a daily-bars-only provider
    pub fn daily_only() -> Self {
        Self {
            daily_bars: true,
            ..Default::default()
        }
    }

    /// Daily bars, profiles and indices
    pub fn full() -> Self {
        Self {
            daily_bars: true,
            company_profiles: true,
            index_data: true,
            max_bars: None,
            rate_limit_rpm: None,
        }
    }
}

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    Network(String),
    /// Request exceeded its deadline
    Timeout,
    /// Authentication error (invalid or missing key)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Data not available for the requested symbol
    DataNotAvailable(String),
    /// Payload could not be parsed or violated series invariants
    Malformed(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal provider error
    Internal(String),
    /// Every registered provider failed; one entry per attempt
    AllProvidersFailed { attempts: Vec<String> },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
            Self::AllProvidersFailed { attempts } => {
                write!(f, "All providers failed")?;
                if !attempts.is_empty() {
                    write!(f, " ({})", attempts.join("; "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if e.is_connect() {
            Self::Network("Connection failed".into())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl ProviderError {
    /// Map a non-success HTTP status to a provider error.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth(format!("HTTP {}", status)),
            404 => Self::DataNotAvailable(format!("HTTP {}", status)),
            429 => Self::RateLimited {
                retry_after_secs: Some(60),
            },
            400 | 422 => Self::InvalidRequest(format!("HTTP {}: {}", status, body)),
            s if s >= 500 => Self::Unavailable(format!("HTTP {}", status)),
            _ => Self::Internal(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }

    /// Check if this error should trigger a failover to another provider.
    ///
    /// Rate limits are retried on the same provider and invalid requests
    /// would fail everywhere, so neither fails over.
    pub fn should_failover(&self) -> bool {
        !matches!(self, Self::RateLimited { .. } | Self::InvalidRequest(_))
    }
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Trait for market data providers.
///
/// All data sources (Twelve Data, Alpha Vantage, snapshots) implement this
/// trait to provide a unified interface for the data router.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Get the provider name (e.g., "twelve_data")
    fn name(&self) -> &str;

    /// Get the provider priority (lower = higher priority)
    fn priority(&self) -> u8;

    /// Get the provider's capabilities
    fn capabilities(&self) -> DataCapabilities;

    /// Check if the provider is healthy and available.
    ///
    /// Should be a lightweight check (e.g., fetch one bar).
    async fn health_check(&self) -> Result<(), ProviderError>;

    /// Fetch up to `limit` most recent daily bars, oldest first.
    async fn get_daily_bars(&self, symbol: &str, limit: usize)
        -> Result<PriceSeries, ProviderError>;

    /// Fetch company fundamentals.
    async fn get_company_profile(&self, symbol: &str) -> Result<CompanyProfile, ProviderError> {
        Err(ProviderError::DataNotAvailable(format!(
            "{} does not serve company profiles ({})",
            self.name(),
            symbol
        )))
    }
}

// ============================================================================
// Provider Info (for monitoring/debugging)
// ============================================================================

/// Information about a data provider for monitoring purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name
    pub name: String,
    /// Effective priority level
    pub priority: u8,
    /// Current health status
    pub healthy: bool,
    /// Capabilities summary
    pub capabilities: DataCapabilities,
    /// Rate limit as (calls, window seconds), if limited
    pub rate_limit: Option<(u32, u64)>,
    /// Last successful request timestamp
    pub last_success: Option<DateTime<Utc>>,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Total requests made
    pub request_count: u64,
    /// Total errors encountered
    pub error_count: u64,
}

impl ProviderInfo {
    /// Create new provider info from a provider
    pub fn from_provider<P: DataProvider + ?Sized>(provider: &P, priority: u8, healthy: bool) -> Self {
        Self {
            name: provider.name().to_string(),
            priority,
            healthy,
            capabilities: provider.capabilities(),
            rate_limit: None,
            last_success: None,
            last_error: None,
            request_count: 0,
            error_count: 0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        let caps = DataCapabilities::daily_only();
        assert!(caps.daily_bars);
        assert!(!caps.company_profiles);

        let caps = DataCapabilities::full();
        assert!(caps.company_profiles);
        assert!(caps.index_data);
    }

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("reset".into()).is_recoverable());
        assert!(ProviderError::Timeout.is_recoverable());
        assert!(ProviderError::RateLimited { retry_after_secs: Some(60) }.is_recoverable());
        assert!(!ProviderError::Auth("invalid key".into()).is_recoverable());
        assert!(!ProviderError::Malformed("bad json".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_failover() {
        assert!(ProviderError::Network("reset".into()).should_failover());
        assert!(ProviderError::Timeout.should_failover());
        assert!(ProviderError::Auth("invalid key".into()).should_failover());
        assert!(ProviderError::DataNotAvailable("no data".into()).should_failover());
        assert!(ProviderError::Malformed("empty values".into()).should_failover());
        assert!(!ProviderError::RateLimited { retry_after_secs: None }.should_failover());
        assert!(!ProviderError::InvalidRequest("bad symbol".into()).should_failover());
    }

    #[test]
    fn test_from_status() {
        use reqwest::StatusCode;
        assert!(matches!(
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(StatusCode::BAD_GATEWAY, ""),
            ProviderError::Unavailable(_)
        ));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(err.to_string().contains("30 seconds"));

        let err = ProviderError::AllProvidersFailed {
            attempts: vec!["td: Request timed out".into(), "av: Network error: x".into()],
        };
        let text = err.to_string();
        assert!(text.starts_with("All providers failed"));
        assert!(text.contains("td: Request timed out"));
    }
}
