//! Sliding window rate limiter for API request throttling.
//!
//! Free-tier market data APIs publish limits as "N calls per minute", so
//! the limiter keeps the timestamps of the last `max_calls` grants and only
//! admits a new call once the oldest one has left the window.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// A sliding window rate limiter.
///
/// Allows up to `max_calls` grants in any `window`-long interval. Callers
/// that exceed the budget wait; no request is ever dropped.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum grants per window
    max_calls: u32,
    /// Window length
    window: Duration,
    /// Grant timestamps inside the current window, oldest first
    calls: Mutex<VecDeque<Instant>>,
    /// Name for logging
    name: String,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `name` - Name for logging purposes
    /// * `max_calls` - Maximum calls per window (at least 1)
    /// * `window` - Window length
    pub fn new(name: impl Into<String>, max_calls: u32, window: Duration) -> Self {
        let max_calls = max_calls.max(1);
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls as usize)),
            name: name.into(),
        }
    }

    /// Create a rate limiter from requests per minute.
    pub fn per_minute(name: impl Into<String>, requests_per_minute: u32) -> Self {
        Self::new(name, requests_per_minute, Duration::from_secs(60))
    }

    /// Acquire a slot, waiting if necessary.
    ///
    /// The window is pruned and updated under one lock, so concurrent
    /// workers never both claim the last slot.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                self.prune(&mut calls, now);

                if calls.len() < self.max_calls as usize {
                    calls.push_back(now);
                    return;
                }

                match calls.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for slot"
            );

            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Try to acquire a slot without waiting.
    ///
    /// Returns `true` if a slot was granted, `false` when the window is full
    /// or another task currently holds the window lock.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut calls) = self.calls.try_lock() else {
            return false;
        };
        let now = Instant::now();
        self.prune(&mut calls, now);

        if calls.len() < self.max_calls as usize {
            calls.push_back(now);
            true
        } else {
            false
        }
    }

    /// Slots currently free in the window.
    pub async fn available(&self) -> u32 {
        let mut calls = self.calls.lock().await;
        self.prune(&mut calls, Instant::now());
        self.max_calls - calls.len() as u32
    }

    /// Get the configured limit as (calls, window).
    pub fn limit(&self) -> (u32, Duration) {
        (self.max_calls, self.window)
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, max_calls: u32, window: Duration) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, max_calls, window))
}

// ============================================================================
// Tests
// ============================================================================
