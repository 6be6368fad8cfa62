//! Provider standing for the failover router.
//!
//! Every request the router makes ends in an [`Outcome`]. A run of
//! failures marks a provider unhealthy; a throttling response starts a
//! cooldown without counting against it. Either one moves the provider
//! behind its peers until it serves a request again.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::provider::DataProvider;

/// Result of one request or health check against a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    Served,
    Failed(&'a str),
    /// The provider asked us to back off; not a failure
    Throttled { retry_after_secs: u64 },
}

/// Routing tier of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Standing {
    /// Healthy and not cooling down
    Preferred,
    /// Tried only after every preferred provider
    LastResort,
}

// ============================================================================
// Per-Provider Record
// ============================================================================

/// Request history of one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub healthy: bool,
    /// Failures since the last served request
    pub failure_streak: u32,
    pub requests: u64,
    pub served: u64,
    pub last_served: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// A fresh provider starts healthy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            failure_streak: 0,
            requests: 0,
            served: 0,
            last_served: None,
            last_error: None,
            cooldown_until: None,
        }
    }

    pub fn record(&mut self, outcome: Outcome<'_>, unhealthy_after: u32) {
        let now = Utc::now();
        self.requests += 1;

        match outcome {
            Outcome::Served => {
                if !self.healthy {
                    info!(provider = %self.name, "Provider serving again");
                }
                self.healthy = true;
                self.failure_streak = 0;
                self.served += 1;
                self.last_served = Some(now);
                self.last_error = None;
            }
            Outcome::Failed(error) => {
                self.failure_streak += 1;
                self.last_error = Some(error.to_string());
                if self.healthy && self.failure_streak >= unhealthy_after {
                    warn!(
                        provider = %self.name,
                        failures = self.failure_streak,
                        "Provider marked unhealthy"
                    );
                    self.healthy = false;
                }
            }
            Outcome::Throttled { retry_after_secs } => {
                self.last_error = Some(format!("throttled for {}s", retry_after_secs));
                self.cooldown_until = Some(now + ChronoDuration::seconds(retry_after_secs as i64));
            }
        }
    }

    pub fn in_cooldown(&self) -> bool {
        self.cooldown_until.is_some_and(|until| Utc::now() < until)
    }

    /// Requests that did not return data.
    pub fn error_count(&self) -> u64 {
        self.requests - self.served
    }

    pub fn standing(&self) -> Standing {
        if self.healthy && !self.in_cooldown() {
            Standing::Preferred
        } else {
            Standing::LastResort
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Consecutive failures before a provider is demoted
    pub unhealthy_threshold: u32,
    pub check_timeout_secs: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
            check_timeout_secs: 10,
        }
    }
}

/// Standing of every registered provider, shared by concurrent requests.
#[derive(Default)]
pub struct HealthMonitor {
    records: RwLock<HashMap<String, ProviderHealth>>,
    config: HealthMonitorConfig,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HealthMonitorConfig) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn register_provider(&self, name: &str) {
        let mut records = self.records.write().await;
        records
            .entry(name.to_string())
            .or_insert_with(|| ProviderHealth::new(name));
        debug!(provider = name, "Tracking provider health");
    }

    /// Unknown providers are last resort.
    pub async fn standing(&self, name: &str) -> Standing {
        let records = self.records.read().await;
        records
            .get(name)
            .map(ProviderHealth::standing)
            .unwrap_or(Standing::LastResort)
    }

    pub async fn get_health(&self, name: &str) -> Option<ProviderHealth> {
        self.records.read().await.get(name).cloned()
    }

    /// Unregistered names are ignored.
    pub async fn record(&self, name: &str, outcome: Outcome<'_>) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(name) {
            record.record(outcome, self.config.unhealthy_threshold);
        }
    }

    /// Run the provider's own health check under the check timeout.
    pub async fn check_provider<P: DataProvider + ?Sized>(&self, provider: &P) -> bool {
        let name = provider.name();
        let timeout = Duration::from_secs(self.config.check_timeout_secs);

        let error = match tokio::time::timeout(timeout, provider.health_check()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("health check timed out".to_string()),
        };

        let mut records = self.records.write().await;
        let record = records
            .entry(name.to_string())
            .or_insert_with(|| ProviderHealth::new(name));
        match &error {
            None => record.record(Outcome::Served, self.config.unhealthy_threshold),
            Some(e) => {
                debug!(provider = name, error = %e, "Health check failed");
                record.record(Outcome::Failed(e), self.config.unhealthy_threshold);
            }
        }
        error.is_none()
    }
}
