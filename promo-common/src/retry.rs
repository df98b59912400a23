//! Bounded retries with a fixed delay for collaborator calls.
//!
//! The parsing core never retries; the driving layer wraps browser and
//! registration calls with [`retry_fixed`] so that a transient navigation
//! timeout does not fail the whole run.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// How many extra attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: usize, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds or `policy.retries` extra attempts were spent.
///
/// `op` receives the 1-based attempt number. The last error is returned.
///
/// ```
/// use promo_common::retry::{retry_fixed, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test_block(async {
/// let policy = RetryPolicy::new(2, Duration::from_millis(1));
/// let got: Result<u32, String> = retry_fixed("demo", policy, |attempt| async move {
///     if attempt < 3 { Err(format!("attempt {attempt} failed")) } else { Ok(7) }
/// })
/// .await;
/// assert_eq!(got, Ok(7));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub async fn retry_fixed<T, E, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1usize;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt <= policy.retries => {
                tracing::warn!(
                    op = label,
                    attempt,
                    max_retries = policy.retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    error = %err,
                    "retry.scheduled"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(op = label, attempt, error = %err, "retry.exhausted");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn returns_first_success_without_retrying() {
        let calls = Cell::new(0);
        let got: Result<&str, String> = retry_fixed("ok", RetryPolicy::default(), |_| {
            calls.set(calls.get() + 1);
            async { Ok("done") }
        })
        .await;
        assert_eq!(got, Ok("done"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget_and_returns_last_error() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let got: Result<(), String> = retry_fixed("fail", policy, |attempt| {
            calls.set(calls.get() + 1);
            async move { Err(format!("boom {attempt}")) }
        })
        .await;
        assert_eq!(got, Err("boom 3".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn no_retry_policy_makes_exactly_one_attempt() {
        let calls = Cell::new(0);
        let got: Result<(), &str> = retry_fixed("once", RetryPolicy::none(), |_| {
            calls.set(calls.get() + 1);
            async { Err("nope") }
        })
        .await;
        assert!(got.is_err());
        assert_eq!(calls.get(), 1);
    }
}
