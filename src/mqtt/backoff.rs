//! Reconnect delay policy.
//!
//! The broker bridge waits a fixed interval between reconnect attempts and never gives
//! up. Both can be changed: an exponential strategy grows the delay up to a cap, and
//! `max_attempts` bounds the number of consecutive failures.
//!
//! ```text
//! Fixed:        delay[n] = interval
//! Exponential:  delay[n] = min(interval * multiplier^(n-1), max_interval)
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned once the configured number of consecutive attempts has been used up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackoffError {
    #[error("Maximum number of attempts exceeded: {0}")]
    MaxAttemptLimitError(u32),
}

/// How the delay evolves across consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first reconnect attempt (and every attempt for `Fixed`).
    pub interval: Duration,
    pub strategy: BackoffStrategy,
    /// Growth factor for `Exponential`; values `<= 1.0` behave like `Fixed`.
    pub multiplier: f64,
    /// Cap for `Exponential`.
    pub max_interval: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            strategy: BackoffStrategy::Fixed,
            multiplier: 2.0,
            max_interval: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }
}

/// Tracks consecutive failures against a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Number of failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Call once a session reached the receive loop.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Records a failure and returns how long to wait before the next attempt.
    pub fn next_sleep(&mut self) -> Result<Duration, BackoffError> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return Err(BackoffError::MaxAttemptLimitError(max));
            }
        }
        self.attempt = self.attempt.saturating_add(1);

        let delay = match self.policy.strategy {
            BackoffStrategy::Fixed => self.policy.interval,
            BackoffStrategy::Exponential => {
                if self.policy.multiplier <= 1.0 {
                    self.policy.interval
                } else {
                    let factor = self.policy.multiplier.powi(self.attempt as i32 - 1);
                    let secs = self.policy.interval.as_secs_f64() * factor;
                    let cap = self.policy.max_interval.as_secs_f64();
                    Duration::from_secs_f64(secs.min(cap))
                }
            }
        };
        Ok(delay)
    }
}
