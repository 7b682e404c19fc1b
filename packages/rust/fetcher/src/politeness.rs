//! Randomized inter-request delay.
//!
//! Applied between successive fetches of distinct resources to stay under
//! anti-scraping thresholds. Ordering and correctness never depend on it.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

use bylines_shared::FetchConfig;

/// Uniformly random pause between `min` and `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Politeness {
    min: Duration,
    max: Duration,
}

impl Politeness {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min > max {
            Self { min: max, max: min }
        } else {
            Self { min, max }
        }
    }

    /// No delay at all (tests, single-page runs).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pick the next delay.
    pub fn next_delay(&self) -> Duration {
        if self.max.is_zero() {
            return Duration::ZERO;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// Sleep for a freshly drawn delay.
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "politeness pause");
        tokio::time::sleep(delay).await;
    }
}

impl From<&FetchConfig> for Politeness {
    fn from(config: &FetchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }
}
