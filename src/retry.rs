//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::InvocationError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `operation`, retrying only transient invocation errors.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, InvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InvocationError>>,
{
    let mut attempts = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match operation().await {
            Ok(result) => {
                if attempts > 0 {
                    debug!("{} succeeded after {} retries", operation_name, attempts);
                }
                return Ok(result);
            }
            Err(e) if !e.is_transient() => {
                warn!("{} failed permanently: {}", operation_name, e);
                return Err(e);
            }
            Err(e) => {
                attempts += 1;

                if attempts > config.max_retries {
                    warn!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempts, e
                    );
                    return Err(e);
                }

                warn!(
                    "{} attempt {}/{} failed: {}. Retrying in {:?}",
                    operation_name, attempts, config.max_retries, e, backoff
                );

                sleep(backoff).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * config.backoff_multiplier) as u64)
                        .min(config.max_backoff.as_millis() as u64),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);

        let result = with_retry("flaky", &fast(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(InvocationError::Transport("reset".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry("auth", &fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InvocationError::Auth("401".into()))
        })
        .await;

        assert!(matches!(result, Err(InvocationError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry("down", &fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InvocationError::RateLimit("429".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
