//! Process-wide token-bucket rate limiting plus retry/backoff for outbound
//! catalog requests (§4.1 "Rate discipline").
//!
//! Grounded in `other_examples/2c25eed9_lukaj99-semantic-scholar-mcp-rs` —
//! a `governor`-backed limiter wrapping a `reqwest` client, which is the
//! pack's closest real-world example of this discipline; the teacher's own
//! `SemanticScholarClient` only carries bare `retry_count`/`wait_time`
//! fields with no actual token bucket, so this module is new.

use crate::error::{RefNetError, RefNetResult};
use governor::{Quota, RateLimiter as GovernorLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use rand::Rng;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type Limiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A single process-wide token bucket gating all outbound requests to one
/// host (§5: "each process owns its own bucket").
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Limiter>,
}

impl RateLimiter {
    /// `requests_per_second` with a burst equal to itself (capped at 1).
    pub fn new(requests_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(requests_per_second.max(1)).unwrap();
        let quota = Quota::per_second(per_second);
        Self {
            inner: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

/// Policy governing retry attempts: capped at 3 attempts, exponential
/// backoff with jitter, the bucket is not refunded between attempts (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.as_millis() as u64 * 2u64.saturating_pow(attempt);
        let capped = exp.min(self.backoff_max.as_millis() as u64);
        let jitter_ms = rand::thread_rng().gen_range(0..=(capped / 4).max(1));
        Duration::from_millis(capped + jitter_ms)
    }
}

/// Run `op` under the rate limiter, retrying on `RefNetError::Transient`
/// and `RefNetError::RateLimited` up to `policy.max_attempts`, with
/// exponential backoff + jitter between attempts. On `RateLimited` with an
/// explicit `Retry-After`, sleeps at least that long before the next try.
pub async fn call_with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    mut op: F,
) -> RefNetResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RefNetResult<T>>,
{
    let mut attempt = 0;
    loop {
        limiter.acquire().await;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let retryable = matches!(
                    err,
                    RefNetError::Transient(_) | RefNetError::RateLimited { .. }
                );
                if !retryable || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let wait = match &err {
                    RefNetError::RateLimited {
                        retry_after: Some(d),
                    } => (*d).max(policy.backoff_for_attempt(attempt)),
                    _ => policy.backoff_for_attempt(attempt),
                };
                warn!(attempt, ?wait, error = %err, "retrying catalog call");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let limiter = RateLimiter::new(1000);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);
        let result: RefNetResult<()> = call_with_retry(&limiter, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RefNetError::Transient("boom".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_success() {
        let limiter = RateLimiter::new(1000);
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&limiter, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RefNetError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let limiter = RateLimiter::new(1000);
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: RefNetResult<()> = call_with_retry(&limiter, &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RefNetError::Permanent("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
