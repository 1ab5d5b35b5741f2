//! Batch admission policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concurrency, pacing and deadline for one scheduler batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Maximum tasks in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Spacing between admission ticks in milliseconds.
    #[serde(default)]
    pub interval_ms: u64,
    /// Overall batch deadline in milliseconds; `None` waits forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            interval_ms: 0,
            timeout_ms: None,
        }
    }
}

impl BatchPolicy {
    /// Creates a policy with the given cap and tick interval and no deadline.
    #[must_use]
    pub fn new(max_concurrent: usize, interval: Duration) -> Self {
        Self {
            max_concurrent,
            interval_ms: duration_to_ms(interval),
            timeout_ms: None,
        }
    }

    /// Sets the batch deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Removes the batch deadline.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout_ms = None;
        self
    }

    /// Returns the concurrency cap, never less than one.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// Returns the admission tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the batch deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
