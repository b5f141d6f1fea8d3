//! # Conflict Retry
//!
//! Redoes a whole ledger operation when it lost a race.
//!
//! ```text
//! attempt 1 ──Conflict──► sleep ~10ms ──► attempt 2 ──Conflict──► sleep ~20ms ──► ...
//!     │                                       │
//!     └── Ok / other error: returned as is    └── budget spent: last Conflict returned
//! ```
//!
//! Each attempt starts from scratch (new locks, new transaction, fresh
//! reads), so nothing from a failed attempt leaks into the next.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Bounds on retrying [`LedgerError::Conflict`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Total time after which the last conflict is surfaced.
    pub max_elapsed: Duration,
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(5),
            max_attempts: 5,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut attempt: u32 = 1;

        loop {
            match op().await {
                Err(err) if err.is_retryable() => {
                    if attempt >= self.max_attempts {
                        warn!(operation, attempt, error = %err, "Giving up after conflicts");
                        return Err(err);
                    }
                    let Some(delay) = backoff.next_backoff() else {
                        warn!(operation, attempt, error = %err, "Retry time budget spent");
                        return Err(err);
                    };
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
            }
        }
    }
}
