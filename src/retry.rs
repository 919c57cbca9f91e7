//! Exponential-backoff retry around a single fallible async call.
//!
//! Used by the order processor around venue calls. This is the inner retry
//! tier; whole-job redelivery is the queue's business (see `queue`).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

/// Retry ceiling and base backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
        }
    }

    /// A ceiling of zero still makes one attempt
    fn ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after the given failed attempt: `base * 2^(attempt - 1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }
}

/// Why a retried call gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; `source` is the last failure
    Exhausted {
        label: String,
        attempts: u32,
        source: E,
    },
    /// The per-attempt hook failed, so retrying stopped early
    Aborted {
        label: String,
        attempt: u32,
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Aborted { source, .. } => source,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RetryError::Exhausted { label, .. } | RetryError::Aborted { label, .. } => label,
        }
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted {
                label,
                attempts,
                source,
            } => write!(f, "{label} failed after {attempts} attempts: {source}"),
            RetryError::Aborted {
                label,
                attempt,
                source,
            } => write!(f, "{label} aborted at attempt {attempt}: {source}"),
        }
    }
}

/// Retry `op` with exponential backoff.
pub async fn with_backoff<T, E, Op, Fut>(
    label: &str,
    policy: &RetryPolicy,
    op: Op,
) -> std::result::Result<T, RetryError<E>>
where
    E: Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    with_backoff_notify(label, policy, op, |_, _| async { Ok(()) }).await
}

/// Retry `op` with exponential backoff, calling `on_retry(attempt, &err)`
/// after every failed attempt that will be retried, before the backoff sleep.
///
/// A hook failure stops the loop and is returned as [`RetryError::Aborted`].
pub async fn with_backoff_notify<T, E, Op, Fut, Hook, HookFut>(
    label: &str,
    policy: &RetryPolicy,
    mut op: Op,
    mut on_retry: Hook,
) -> std::result::Result<T, RetryError<E>>
where
    E: Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    Hook: FnMut(u32, &E) -> HookFut,
    HookFut: Future<Output = std::result::Result<(), E>>,
{
    let max_attempts = policy.ceiling();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            error!(
                context = label,
                attempt,
                error = %err,
                "All retry attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                label: label.to_string(),
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.backoff_for(attempt);
        warn!(
            context = label,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after exponential backoff"
        );

        if let Err(hook_err) = on_retry(attempt, &err).await {
            error!(context = label, attempt, error = %hook_err, "Retry hook failed");
            return Err(RetryError::Aborted {
                label: label.to_string(),
                attempt,
                source: hook_err,
            });
        }

        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10))
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_kth_attempt_and_notifies_k_minus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let result = with_backoff_notify(
            "flaky",
            &fast_policy(4),
            || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("failure {n}"))
                    } else {
                        Ok(n)
                    }
                }
            },
            |attempt, _err: &String| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(attempt);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_stops_at_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = with_backoff("doomed", &fast_policy(3), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("venue down".to_string())
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted {
                label,
                attempts,
                source,
            }) => {
                assert_eq!(label, "doomed");
                assert_eq!(attempts, 3);
                assert_eq!(source, "venue down");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ceiling_still_attempts_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: std::result::Result<(), _> = with_backoff("once", &fast_policy(0), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hook_failure_aborts_without_further_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: std::result::Result<(), _> = with_backoff_notify(
            "hooked",
            &fast_policy(5),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("venue down".to_string())
                }
            },
            |_, _| async { Err("db unavailable".to_string()) },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result {
            Err(RetryError::Aborted { attempt, source, .. }) => {
                assert_eq!(attempt, 1);
                assert_eq!(source, "db unavailable");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_exponentially_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: std::result::Result<(), _> = with_backoff(
            "timed",
            &RetryPolicy::new(3, Duration::from_millis(100)),
            || async { Err("x".to_string()) },
        )
        .await;

        // 100ms + 200ms, no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }
}
