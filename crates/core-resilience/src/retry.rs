//! Bounded exponential-backoff retry policy
//!
//! The policy only answers "how many attempts" and "how long to wait before
//! the next one". Running the attempts, picking connections and honoring
//! cancellation is up to the caller.
//!
//! # Example
//!
//! ```
//! use kbus_core_resilience::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default();
//! let delays: Vec<Duration> = config.backoff().collect();
//!
//! assert_eq!(config.max_attempts(), 4);
//! assert_eq!(
//!     delays,
//!     vec![
//!         Duration::from_millis(100),
//!         Duration::from_millis(200),
//!         Duration::from_millis(400),
//!     ]
//! );
//! ```

use super::error::ResilienceError;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Wait before the first retry
    pub initial_interval: Duration,

    /// Upper bound on any single wait
    pub max_interval: Duration,

    /// Growth factor applied to the wait after each retry
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Total number of attempts, counting the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// The wait that follows `current`, capped at `max_interval`
    pub fn next_interval(&self, current: Duration) -> Duration {
        if current >= self.max_interval {
            return self.max_interval;
        }
        let scaled = Duration::from_secs_f64(current.as_secs_f64() * self.multiplier);
        std::cmp::min(scaled, self.max_interval)
    }

    /// Waits to apply before each retry, in order
    pub fn backoff(&self) -> Backoff<'_> {
        Backoff {
            config: self,
            next: self.initial_interval,
            remaining: self.max_retries,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ResilienceError> {
        if self.initial_interval.is_zero() {
            return Err(ResilienceError::InvalidConfig(
                "initial_interval must be greater than 0".to_string(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(ResilienceError::InvalidConfig(
                "max_interval must not be smaller than initial_interval".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ResilienceError::InvalidConfig(
                "multiplier must be a finite value >= 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Iterator over retry waits produced by [`RetryConfig::backoff`]
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
    remaining: u32,
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = std::cmp::min(self.next, self.config.max_interval);
        self.next = self.config.next_interval(current);
        Some(current)
    }
}
