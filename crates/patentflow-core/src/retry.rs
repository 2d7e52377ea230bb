use std::{future::Future, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::{error::InferenceError, types::StageKind};

/// Bounded retry with exponential backoff around one model call. Each attempt
/// is also bounded by `call_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            call_timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Delay after the given failed attempt (1-based): doubles from
    /// `min_backoff`, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.pow(attempt.saturating_sub(1).min(5));
        self.min_backoff.saturating_mul(multiplier).min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, stage: StageKind, mut call: F) -> Result<T, InferenceError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InferenceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.call_timeout, call(attempt)).await {
                Ok(r) => r,
                Err(_) => Err(InferenceError::Timeout(self.call_timeout)),
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = err
                .retry_after()
                .map_or_else(|| self.backoff(attempt), |after| after.max(self.backoff(attempt)))
                .min(self.max_backoff);
            warn!(
                stage = %stage,
                attempt,
                max_attempts,
                code = err.code(),
                delay_ms = delay.as_millis() as u64,
                "inference attempt failed, retrying: {err}"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_doubles_within_window() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(9), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let out = RetryPolicy::immediate(3)
            .run(StageKind::Extract, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(InferenceError::InvalidResponseShape("truncated".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run(StageKind::Qc, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(InferenceError::upstream("503")) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "upstream_error");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::immediate(3)
            .run(StageKind::Write, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(InferenceError::Config("no api key".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "config");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let policy = RetryPolicy::immediate(1).with_call_timeout(Duration::from_millis(10));
        let err = policy
            .run(StageKind::Extract, |_| async {
                sleep(Duration::from_secs(5)).await;
                Ok::<_, InferenceError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Timeout(_)));
    }
}
