//! Request pacing
//!
//! This module handles:
//! - The randomized politeness delay required between consecutive fetches
//! - Exponential backoff for retrying transient fetch failures

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Randomized pause between consecutive requests to a target
///
/// Every fetch in a seed's walk, list page or thread, is followed by a call
/// to [`Politeness::pause`]. The same type paces batch chunk retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Politeness {
    min: Duration,
    max: Duration,
}

impl Politeness {
    /// Creates a delay drawn uniformly from `[min, max]`
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// Builds the crawl politeness delay from configuration
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::from_millis(config.delay_min_ms, config.delay_max_ms)
    }

    /// A zero delay, for tests and offline replays
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draws the next delay
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let (lo, hi) = (self.min.as_millis() as u64, self.max.as_millis() as u64);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Sleeps for a freshly drawn delay
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::trace!("Politeness pause of {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Exponential backoff with proportional jitter
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    fn capped_ms(&self, attempt: u32) -> u64 {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        exponential_delay.min(self.max_ms)
    }

    /// Longest delay [`ExponentialBackoff::delay`] can return for `attempt`
    pub fn upper_bound(&self, attempt: u32) -> Duration {
        let capped_delay = self.capped_ms(attempt);
        Duration::from_millis(capped_delay + capped_delay * self.jitter_percent / 100)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped_delay = self.capped_ms(attempt);
        let jitter = if self.jitter_percent > 0 && capped_delay > 0 {
            rand::thread_rng().gen_range(0..capped_delay * self.jitter_percent / 100 + 1)
        } else {
            0
        };
        Duration::from_millis(capped_delay + jitter)
    }
}
