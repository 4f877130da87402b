//! Opt-in retry for callers of the resolver.
//!
//! The resolver never retries on its own. Wrap a call in [`retry`] to re-run
//! it on transient failures (transport errors, upstream 5xx and 429). Auth and
//! credential rejections usually mean a misconfigured principal, so they are
//! returned immediately.
//!
//! Delays follow a Fibonacci sequence capped at a maximum:
//! with a 500ms base the waits are 500ms, 500ms, 1s, 1.5s, 2.5s, ...

use crate::{LakebaseError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fibonacci backoff calculator.
///
/// Each delay is the sum of the previous two, starting from `min` twice,
/// capped at `max`.
///
/// # Example
///
/// ```
/// use lakebase::retry::FibonacciBackoff;
/// use std::time::Duration;
///
/// let mut backoff = FibonacciBackoff::new(Duration::from_secs(1), Duration::from_secs(4));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
/// assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Creates a backoff starting at `min` and capped at `max`.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min.min(max),
            max,
        }
    }

    /// Returns the next delay and advances the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Resets to the initial delay.
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min.min(self.max);
    }
}

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1)
    pub max_attempts: u32,
    /// First delay
    pub min_backoff: Duration,
    /// Largest delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` and the default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Sets the delay bounds.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max;
        self
    }

    fn backoff(&self) -> FibonacciBackoff {
        FibonacciBackoff::new(self.min_backoff, self.max_backoff)
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy runs out of attempts.
///
/// # Example
///
/// ```no_run
/// use lakebase::retry::{retry, RetryPolicy};
///
/// #[tokio::main]
/// async fn main() -> lakebase::Result<()> {
///     let uri = retry(RetryPolicy::default(), || {
///         lakebase::resolve_connection_uri(
///             "https://adb-123.azuredatabricks.net",
///             "sp-1",
///             "oauth-secret",
///             None,
///             "pgh-stateful-backend",
///         )
///     })
///     .await?;
///     # let _ = uri;
///     Ok(())
/// }
/// ```
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.backoff();
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_transient() => {
                let delay = backoff.next_backoff();
                warn!(attempt, max_attempts, ?delay, error = %err, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Returns `true` if [`retry`] would re-run after `err`.
pub fn should_retry(err: &LakebaseError) -> bool {
    err.is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transport_error() -> LakebaseError {
        LakebaseError::transport(
            Operation::CredentialFetch,
            Box::new(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out")),
        )
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts).with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_fibonacci_sequence_and_cap() {
        let mut backoff = FibonacciBackoff::new(Duration::from_millis(100), Duration::from_millis(450));
        let delays: Vec<u128> = (0..7).map(|_| backoff.next_backoff().as_millis()).collect();
        assert_eq!(delays, vec![100, 100, 200, 300, 450, 450, 450]);

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result = retry(fast_policy(5), || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(transport_error())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<()> = retry(fast_policy(3), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transport_error())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_auth_rejection() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let result: Result<()> = retry(fast_policy(5), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LakebaseError::AuthExchange {
                    status: Some(401),
                    reason: "HTTP 401: invalid_client".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(LakebaseError::AuthExchange { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(!should_retry(&LakebaseError::AuthExchange {
            status: None,
            reason: String::new(),
        }));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);

        let _ = retry(fast_policy(0), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(transport_error())
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
