//! Rate limiting implementation
//!
//! Uses the governor crate's GCRA limiter. A budget of `max_calls` per
//! `period` is expressed as a burst of `max_calls` cells, one of which is
//! replenished every `period / max_calls`.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Calls allowed per period
    pub max_calls: u32,
    /// Length of the rolling window
    pub period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::hubspot()
    }
}

impl RateLimiterConfig {
    /// Create a new rate limiter config
    pub fn new(max_calls: u32, period: Duration) -> Self {
        Self { max_calls, period }
    }

    /// Budget for OAuth apps: 100 calls every 10 seconds
    pub fn hubspot() -> Self {
        Self {
            max_calls: 100,
            period: Duration::from_secs(10),
        }
    }

    /// Interval after which one more call becomes available
    pub fn replenish_interval(&self) -> Duration {
        self.period / self.max_calls.max(1)
    }
}

/// Rolling-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: &RateLimiterConfig) -> Self {
        let burst = NonZeroU32::new(config.max_calls).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(config.replenish_interval())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request can be made
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a permit, returning immediately
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Wait with a timeout
    pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.limiter.until_ready())
            .await
            .is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimiterConfig::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}
