// src/retry.rs

//! Bounded retry with jittered exponential backoff
//!
//! Used for snapshot persistence under contention (another invocation holds
//! the repository lock) and for flaky external services. Only errors for
//! which [`Error::is_transient`] holds are retried; everything else is
//! returned immediately.

use crate::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Random extra delay as a fraction of the computed delay (0.0 - 1.0)
    pub jitter_factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
        let capped = exp.min(self.max_delay);
        let jitter = rand::random::<f32>() * self.jitter_factor.clamp(0.0, 1.0);
        capped.mul_f32(1.0 + jitter)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, F>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    warn!(operation = operation_name, attempt, error = %e, "retries exhausted");
                    return Err(Error::RetriesExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
