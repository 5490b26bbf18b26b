//! Retry with exponential backoff for fallible async actions.
//!
//! Rate limiting (HTTP 429) and timeouts are routine when many batches hit
//! the same extraction API at once. [`retry_with_backoff`] is the only place
//! backoff is defined: attempt `n` that fails transiently waits
//! `min(base_delay * 2^(n-1), max_delay)` before attempt `n + 1`.
//! Permanent failures (bad request, auth) are returned on the spot and never
//! retried, so they cannot be masked as eventual success.
//!
//! There is no coordination between concurrent callers: each batch backs off
//! on its own schedule.

use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

/// Classifies an error as worth retrying.
///
/// Errors are assumed permanent unless they say otherwise, so unknown failure
/// modes never trigger a long run of backed-off retries.
pub trait IsTransient {
    /// Is this error likely to resolve on its own with time?
    fn is_transient(&self) -> bool;
}

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_retries: u32,
    /// Delay after the first transient failure.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Why [`retry_with_backoff`] gave up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed transiently. `last` is the final failure.
    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The action failed with a non-transient error; no retry was made after it.
    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying failure, whichever way the retry loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
///
/// `label` only appears in log lines.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsTransient + fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{}: succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                if attempt >= max_attempts {
                    error!("{}: exceeded maximum retries ({}): {}", label, max_attempts, e);
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "{}: {}; retrying in {:?} (attempt {}/{})",
                    label, e, delay, attempt, max_attempts
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                error!("{}: permanent failure on attempt {}: {}", label, attempt, e);
                return Err(RetryError::Permanent(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Busy,
        Broken,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TestError::Busy => write!(f, "busy"),
                TestError::Broken => write!(f, "broken"),
            }
        }
    }

    impl IsTransient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Busy)
        }
    }

    fn policy(max_retries: u32, base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn delay_doubles_then_caps() {
        let p = policy(10, 1000, 5000);
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(2000));
        assert_eq!(p.delay_for(3), Duration::from_millis(4000));
        assert_eq!(p.delay_for(4), Duration::from_millis(5000));
        assert_eq!(p.delay_for(40), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_transient_failures_with_summed_delay() {
        let p = policy(5, 100, 250);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let out = retry_with_backoff(&p, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(TestError::Busy)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(out, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + min(400, 250)
        assert_eq!(start.elapsed(), Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_exhausts_after_exact_attempts() {
        let p = policy(4, 10, 1000);
        let calls = AtomicU32::new(0);

        let out: Result<(), _> = retry_with_backoff(&p, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Busy) }
        })
        .await;

        assert_eq!(
            out,
            Err(RetryError::Exhausted {
                attempts: 4,
                last: TestError::Busy
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let p = policy(10, 1000, 1000);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let out: Result<(), _> = retry_with_backoff(&p, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Broken) }
        })
        .await;

        assert_eq!(out, Err(RetryError::Permanent(TestError::Broken)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_after_transient_stops_immediately() {
        let p = policy(10, 10, 10);
        let calls = AtomicU32::new(0);

        let out: Result<(), _> = retry_with_backoff(&p, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TestError::Busy)
                } else {
                    Err(TestError::Broken)
                }
            }
        })
        .await;

        assert_eq!(out.unwrap_err().into_inner(), TestError::Broken);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_budget_still_makes_one_attempt() {
        let p = policy(0, 1, 1);
        let out: Result<u8, RetryError<TestError>> =
            retry_with_backoff(&p, "test", || async { Ok(7) }).await;
        assert_eq!(out, Ok(7));
    }
}
