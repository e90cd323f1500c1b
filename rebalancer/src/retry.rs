//! Bounded retry for broker calls.
//!
//! Only transient errors (see [`BrokerError::is_transient`]) are retried.
//! The delay starts at `base_delay` and doubles on every further attempt.

use std::thread;
use std::time::Duration;

use log::warn;
use lotplan_broker::BrokerError;

use crate::config::ExecutionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    ///
    /// The last error is returned once retries run out, or at once for a
    /// permanent error.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    warn!(
                        "{what}: {e}, retry {attempt}/{} in {}ms",
                        self.max_retries,
                        delay.as_millis()
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
                result => return result,
            }
        }
    }
}
