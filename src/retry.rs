//! Bounded retry with exponential backoff for transport calls

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// A successful call and how many retries it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt; doubles for each further one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Backoff after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, fails terminally, or the attempt
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// Returns the first terminal error, the last transient error once
    /// all attempts are used, or [`Error::Cancelled`] if `cancel` fires
    /// before or between attempts.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Retried<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let err = match op().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        retries: attempt - 1,
                    });
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation = label,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient failure, retrying"
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
