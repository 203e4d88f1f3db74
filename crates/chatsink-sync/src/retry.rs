// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential-backoff retry for transient storage conflicts.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use chatsink_config::RetryConfig;
use chatsink_core::SyncError;

/// Backoff parameters. Attempt *n* waits `base_delay * 2^(n-1)` plus a small
/// random jitter, bounded by `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Cap the shift so pathological attempt counts cannot overflow.
        let exponent = (attempt.saturating_sub(1)).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=50));
        backoff + jitter
    }
}

/// Run `operation`, retrying only errors classified transient by
/// [`SyncError::is_transient`].
///
/// Non-transient errors propagate immediately. Exhausting the attempt
/// budget re-raises the last observed error unchanged.
pub async fn with_retry<T, F, Fut>(
    op_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op = op_name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    %error,
                    delay_ms = delay.as_millis() as u64,
                    "transient storage conflict, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    fn conflict() -> SyncError {
        SyncError::Conflict {
            message: "database is locked".to_string(),
        }
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_retry("test-op", &fast_policy(3), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(conflict()) } else { Ok(n) }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        // Two retries after the initial attempt.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_never_retry() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), SyncError> = with_retry("test-op", &fast_policy(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::Config("bad".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Config(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_the_last_error_unchanged() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), SyncError> = with_retry("test-op", &fast_policy(3), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(SyncError::Conflict {
                    message: format!("deadlock on attempt {n}"),
                })
            }
        })
        .await;

        match result {
            Err(SyncError::Conflict { message }) => {
                assert_eq!(message, "deadlock on attempt 3");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        };
        // Jitter adds at most 50ms on top of the exponential base.
        let first = policy.delay_for_attempt(1);
        let third = policy.delay_for_attempt(3);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));
    }
}
