//! Inter-page pacing
//!
//! The crawler walks a single chain of pages, so scheduling reduces to one
//! decision: how long to wait before the next request. A randomized pause
//! within configured bounds keeps request timing irregular and load on the
//! source low.

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Randomized delay between consecutive page fetches
#[derive(Debug, Clone)]
pub struct Pacer {
    min: Duration,
    max: Duration,
}

impl Pacer {
    /// Creates a pacer with explicit bounds
    ///
    /// Bounds given in the wrong order are swapped.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Creates a pacer from the crawler configuration
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// A pacer that never waits (used by tests and local fixtures)
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draws the next delay, uniformly within the bounds
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }

        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }

    /// Sleeps for a freshly drawn delay and returns it
    pub async fn pause(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tracing::debug!("Pausing {:.1}s before next page", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
        delay
    }
}
