use std::future::Future;
use std::time::Duration;

use rand::Rng;
use screener_core::{ProviderError, ThrottlingConfig};

/// Bounded exponential backoff with random jitter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn from_config(throttling: &ThrottlingConfig) -> Self {
        Self {
            max_retries: throttling.max_retries,
            base_delay: Duration::from_millis(throttling.base_delay_ms),
            max_delay: Duration::from_millis(throttling.max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based): base * 2^attempt,
    /// capped, plus up to 50% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_cap = (exp.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op`, retrying transport-class failures up to `policy.max_retries`
/// times. Access and limit errors are never retried; they are not transient.
pub async fn with_backoff<T, F, Fut>(policy: &BackoffPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                tracing::warn!(
                    "transient provider error (retry {}/{} in {:.2}s): {}",
                    attempt,
                    policy.max_retries,
                    delay.as_secs_f64(),
                    err
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_transport_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Transport("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transport("down".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Transport(_))));
        // initial call plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn access_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::access("AAA", "unknown symbol")) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Access { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
