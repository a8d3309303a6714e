//! Minimum-interval request spacing.
//!
//! arXiv asks API clients to leave about three seconds between requests.
//! [`RateLimiter`] enforces a fixed gap between permitted calls and is shared
//! (behind an `Arc`) by every crawl using the same client, so concurrent
//! crawls queue up behind one another instead of each keeping its own budget.

use anyhow::{bail, Result};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

/// Gap between requests for a rate given in requests per second.
///
/// Fails for zero, negative or non-finite rates, and for rates so small
/// that the gap does not fit in a [`Duration`].
pub fn min_interval_for(requests_per_second: f64) -> Result<Duration> {
    if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
        bail!(
            "requests_per_second must be a finite number > 0, got {}",
            requests_per_second
        );
    }
    match Duration::try_from_secs_f64(1.0 / requests_per_second) {
        Ok(interval) => Ok(interval),
        Err(_) => bail!(
            "requests_per_second {} is too small: the gap between requests overflows",
            requests_per_second
        ),
    }
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Result<Self> {
        Ok(Self {
            min_interval: min_interval_for(requests_per_second)?,
            last: Mutex::new(None),
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request is allowed.
    ///
    /// The lock is held across the sleep so waiters are released one
    /// interval apart, in arrival order.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if ready_at > Instant::now() {
                tracing::debug!(
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "rate limit: waiting"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
