//! Transient-failure retry policy shared by every network call.
//!
//! One [`TransientRetryPolicy`] value is built from configuration and handed
//! to both the listing fetcher and the article fetcher, so pagination and
//! article downloads back off and classify errors identically.
//!
//! # Per-call state machine
//!
//! ```text
//! Attempting ──ok──────────────────────────▶ Success
//!     │
//!     ├─fatal error────────────────────────▶ Fatal
//!     │
//!     └─retryable error─┬─attempt < max──▶ RetryWait ──▶ Attempting
//!                       └─attempt = max──▶ Exhausted
//! ```
//!
//! Cancellation is observed before every attempt, during an in-flight attempt
//! and during every backoff wait.
//!
//! # Backoff
//!
//! ```text
//! delay = min(max_delay, base_delay * multiplier^(attempt-1)) * (1 ± jitter)
//! ```

use crate::error::{AttemptError, FetchFailure};
use rand::{Rng, rng};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Bounded exponential backoff with symmetric jitter.
///
/// The policy holds no mutable state, so a single value can be shared by any
/// number of concurrent fetches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransientRetryPolicy {
    /// Total attempts allowed, including the first one.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    /// Fraction of the computed delay added or removed at random, in `[0, 1]`.
    jitter: f64,
}

impl Default for TransientRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl TransientRetryPolicy {
    /// Create a policy. Values are assumed validated by the configuration
    /// layer; `max_attempts` is clamped to at least one attempt.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Delay actually slept after the given failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor: f64 = rng().random_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + factor).max(0.0))
    }

    /// Drive `op` until it succeeds, fails fatally, exhausts the attempt
    /// budget or `cancel` fires.
    ///
    /// `op` is called once per attempt and must build a fresh request each
    /// time.
    ///
    /// # Errors
    ///
    /// - [`FetchFailure::Fatal`] on the first non-retryable error
    /// - [`FetchFailure::Exhausted`] after exactly `max_attempts` retryable errors
    /// - [`FetchFailure::Cancelled`] when cancellation is observed
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let total_t0 = Instant::now();
        let mut last: Option<AttemptError> = None;
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchFailure::Cancelled { last });
            }
            attempt += 1;
            let attempt_t0 = Instant::now();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled { last }),
                r = op() => r,
            };

            let e = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "attempt succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !e.is_retryable() {
                warn!(attempt, error = %e, "non-retryable failure");
                return Err(FetchFailure::Fatal(e));
            }

            if attempt >= self.max_attempts {
                error!(
                    attempt,
                    max = self.max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis(),
                    error = %e,
                    "retries exhausted"
                );
                return Err(FetchFailure::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt,
                max = self.max_attempts,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                ?delay,
                error = %e,
                "attempt failed; backing off"
            );
            last = Some(e);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchFailure::Cancelled { last }),
                _ = sleep(delay) => {}
            }
        }
    }
}
