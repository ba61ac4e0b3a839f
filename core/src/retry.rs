//! Bounded exponential-backoff retry loop shared by the dispatcher and the
//! provider handlers.
//!
//! The loop walks the states Attempting(n) -> Waiting(n, delay) ->
//! Attempting(n+1), doubling the delay on every wait. Waiting is delegated
//! to a [`Waiter`] so callers can substitute a virtual clock in tests and
//! assert the exact delay sequence without real time passing.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

/// Classification hooks the retry loop needs from an error type.
pub trait RetryClass {
    /// Whether another attempt could plausibly succeed.
    fn is_retryable(&self) -> bool;

    /// Wrap the final error once the attempt budget is spent.
    fn after_retries(self, attempts: u32) -> Self;
}

/// Suspends the current call between attempts.
#[async_trait]
pub trait Waiter: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Production waiter backed by the tokio timer.
pub struct TokioWaiter;

#[async_trait]
impl Waiter for TokioWaiter {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Five attempts with waits of 1000, 2000, 4000, and 8000 ms between them.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Drive `op` until it succeeds, fails terminally, or exhausts the policy.
///
/// Only the call owning this future is suspended during waits; concurrent
/// calls keep their own retry state.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    waiter: &dyn Waiter,
    mut op: F,
) -> Result<T, E>
where
    E: RetryClass + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    log::debug!("call succeeded on attempt {attempt}/{}", policy.max_attempts);
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                log::debug!("terminal error on attempt {attempt}: {err}");
                return Err(err);
            }
            Err(err) => {
                if attempt >= policy.max_attempts {
                    log::warn!(
                        "retries exhausted after {} attempts: {err}",
                        policy.max_attempts
                    );
                    return Err(err.after_retries(policy.max_attempts));
                }
                log::warn!(
                    "attempt {attempt}/{} failed: {err}; retrying in {}ms",
                    policy.max_attempts,
                    delay.as_millis()
                );
                waiter.wait(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingWaiter;
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient(&'static str),
        Terminal(&'static str),
        Exhausted(u32, String),
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Transient(msg) | Self::Terminal(msg) => write!(f, "{msg}"),
                Self::Exhausted(attempts, last) => {
                    write!(f, "failed after {attempts} retries: {last}")
                }
            }
        }
    }

    impl RetryClass for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Transient(_))
        }

        fn after_retries(self, attempts: u32) -> Self {
            Self::Exhausted(attempts, self.to_string())
        }
    }

    async fn flaky(
        calls: &AtomicU32,
        failures_before_success: u32,
    ) -> Result<&'static str, TestError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures_before_success {
            Err(TestError::Transient("status 429"))
        } else {
            Ok("ok")
        }
    }

    #[tokio::test]
    async fn first_attempt_success_never_waits() {
        let waiter = RecordingWaiter::default();
        let calls = AtomicU32::new(0);
        let result =
            run_with_retry(&RetryPolicy::default(), &waiter, || flaky(&calls, 0)).await;
        assert_eq!(result.unwrap(), "ok");
        assert!(waiter.delays_ms().is_empty());
    }

    #[tokio::test]
    async fn waits_double_until_success() {
        let waiter = RecordingWaiter::default();
        let calls = AtomicU32::new(0);
        let result =
            run_with_retry(&RetryPolicy::default(), &waiter, || flaky(&calls, 3)).await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(waiter.delays_ms(), vec![1000, 2000, 4000]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhaustion_waits_four_times_and_wraps_last_error() {
        let waiter = RecordingWaiter::default();
        let calls = AtomicU32::new(0);
        let result: Result<&'static str, _> =
            run_with_retry(&RetryPolicy::default(), &waiter, || flaky(&calls, 10)).await;
        assert_eq!(waiter.delays_ms(), vec![1000, 2000, 4000, 8000]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result.unwrap_err() {
            TestError::Exhausted(attempts, last) => {
                assert_eq!(attempts, 5);
                assert!(last.contains("429"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_error_fails_immediately() {
        let waiter = RecordingWaiter::default();
        let calls = AtomicU32::new(0);
        let result: Result<&'static str, _> =
            run_with_retry(&RetryPolicy::default(), &waiter, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Terminal("status 401"))
            })
            .await;
        assert!(matches!(result, Err(TestError::Terminal(_))));
        assert!(waiter.delays_ms().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
