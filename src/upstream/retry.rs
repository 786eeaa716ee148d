//! Retry policy shared by every upstream call.
//!
//! The policy is a plain value: it knows how many attempts to make and how
//! long to wait between them, and drives an operation until it succeeds or the
//! budget is spent. Every failed attempt is retried. Nothing here touches the
//! network.

use crate::config::RetryConfig;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Failure of a single attempt: transport error, non-200 status, unreadable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError(pub String);

/// The operation ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError {
    /// Attempts actually made.
    pub attempts: u32,
    /// Cause of the most recent failure.
    pub cause: String,
}

/// How many times an upstream call is attempted and how long to wait in between.
///
/// `max_retries = 3` means four attempts in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Base backoff delay; zero disables waiting between attempts.
    pub base_delay_ms: u64,
    /// Cap on a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately, without backoff.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the next attempt, given how many attempts already failed.
    ///
    /// Exponential in `failures`, capped at `max_delay_ms`, plus up to 10% jitter.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 || self.base_delay_ms == 0 {
            return Duration::ZERO;
        }

        let exponential_base = 2u64.saturating_pow(failures - 1);
        let delay_ms = self.base_delay_ms.saturating_mul(exponential_base);
        let capped_delay = delay_ms.min(self.max_delay_ms.max(self.base_delay_ms));

        let jitter_range = capped_delay / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped_delay + jitter)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.max_attempts();
        let mut last_cause = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.backoff(attempt - 1);
                if !delay.is_zero() {
                    debug!("{}: waiting {:?} before attempt {}", label, delay, attempt);
                    tokio::time::sleep(delay).await;
                }
            }

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{}: succeeded on attempt {}/{}", label, attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(AttemptError(cause)) => {
                    warn!(
                        "{}: attempt {}/{} failed: {}",
                        label, attempt, max_attempts, cause
                    );
                    last_cause = cause;
                }
            }
        }

        Err(RetryError {
            attempts: max_attempts,
            cause: last_cause,
        })
    }
}
