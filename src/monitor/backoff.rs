//! Linear backoff used while the log file is missing or unreadable.

use std::time::Duration;

/// Default delay between polls and the first backoff step.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// `min(base * k, max)` for the k-th consecutive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    base: Duration,
    max: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl LinearBackoff {
    /// Creates a backoff. A `max` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// The base delay, also used as the regular poll interval.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// The delay ceiling.
    #[must_use]
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Delay after `failures` consecutive failures. Zero failures yields `base`.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        self.base
            .checked_mul(failures.max(1))
            .map_or(self.max, |d| d.min(self.max))
    }
}
