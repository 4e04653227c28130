//! Bounded retry loop.
//!
//! Retries run back to back by default; `delay` exists for callers that want
//! a fixed pause between attempts.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const LOG_TARGET: &str = "util::retry";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts allowed after the first one fails.
    pub max_retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Error from the last attempt, with how many attempts were made.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
pub async fn retry<F, T, E, Fut>(
    config: &RetryConfig,
    mut f: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts();
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(target: LOG_TARGET, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if attempt >= max_attempts || !is_retryable(&error) {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        error,
                    });
                }
                debug!(target: LOG_TARGET, attempt, max_attempts, "attempt failed, retrying");
                if !config.delay.is_zero() {
                    sleep(config.delay).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn gives_up_after_max_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let config = RetryConfig::new(3);
        let result: Result<(), _> = retry(
            &config,
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            },
            |_| true,
        )
        .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.error, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(
            &RetryConfig::new(5),
            || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(
            &RetryConfig::new(3),
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("fatal")
            },
            |e: &&str| *e != "fatal",
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let _ = retry(
            &RetryConfig::new(0),
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(())
            },
            |_| true,
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
