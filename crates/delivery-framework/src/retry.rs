//! # Retry Policy
//!
//! Pure decision logic: is a failure worth another attempt, and how long to
//! wait before making it.
//!
//! A failure is retryable when it carries no response status (network-class)
//! or when its status is in `500..=599`. Everything else is fatal.
//!
//! Backoff is exponential and capped:
//!
//! ```text
//! delay_for(n) = min(base * 2^(n-1), cap)
//! ```
//!
//! With the defaults (base 5s, cap 60s, 3 retries) a task gets at most four
//! attempts, spaced 5s, 10s and 20s apart.

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_CAP_DELAY: Duration = Duration::from_millis(60_000);

/// How a [`TaskError`] is treated by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Serializable form of [`RetryPolicy`], used in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Number of retries after the first failed attempt.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            cap_delay_ms: DEFAULT_CAP_DELAY.as_millis() as u64,
        }
    }
}

/// Retry decisions for the [`TaskExecutor`](crate::TaskExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    cap_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, DEFAULT_CAP_DELAY)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.cap_delay_ms),
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, cap_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            cap_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify a failure. No status or a 5xx status is retryable.
    pub fn classify(error: &TaskError) -> FailureClass {
        match error {
            TaskError::Failed(_) => FailureClass::Retryable,
            TaskError::Status { code, .. } if (500..=599).contains(code) => FailureClass::Retryable,
            TaskError::Status { .. } | TaskError::Fatal(_) | TaskError::Panicked(_) => {
                FailureClass::Fatal
            }
        }
    }

    /// Whether retry number `attempt` (1 for the first retry) should be made.
    pub fn should_retry(&self, error: &TaskError, attempt: u32) -> bool {
        attempt <= self.max_attempts && Self::classify(error) == FailureClass::Retryable
    }

    /// Delay before retry number `attempt`. Saturates at the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(attempt - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.cap_delay, |delay| delay.min(self.cap_delay))
    }
}
