use genmux_common::protocol::error::{DispatchError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for the retry loop around each request.
///
/// A request is attempted at most `retry_limit` times. After the n-th
/// consecutive failure the coordinator waits `base_delay * n` before
/// re-entering node selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts allowed per request (not retries after the first)
    ///
    /// Default: 3
    pub retry_limit: u32,
    /// Delay unit; the wait after n failures is `base_delay * n`
    ///
    /// Default: 1s
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn new(retry_limit: u32, base_delay: Duration) -> Self {
        Self {
            retry_limit,
            base_delay,
        }
    }

    /// Linear backoff after `attempts` failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay.saturating_mul(attempts)
    }
}

/// Successful result of a retried operation.
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    /// Attempts made, including the successful one
    pub attempts: u32,
}

/// Runs `op` until it succeeds or the attempt budget is spent.
///
/// `op` receives the 1-based attempt number. `on_failure` observes every
/// failed attempt before the backoff sleep. Exhaustion, or a failure that is
/// not retryable, rejects with `RetryExhausted` carrying the last error and
/// the number of attempts made.
pub async fn run_with_retry<T, F, Fut, O>(
    config: &RetryConfig,
    mut op: F,
    mut on_failure: O,
) -> Result<Retried<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    O: FnMut(u32, &DispatchError),
{
    let mut attempts = 0u32;

    loop {
        let error = match op(attempts + 1).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempts + 1,
                })
            }
            Err(e) => e,
        };

        attempts += 1;
        on_failure(attempts, &error);

        if attempts >= config.retry_limit || !error.is_retryable() {
            return Err(DispatchError::RetryExhausted {
                attempts,
                last_error: Box::new(error),
            });
        }

        let delay = config.delay_for(attempts);
        warn!(
            attempt = attempts,
            limit = config.retry_limit,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed: {}, retrying",
            error
        );
        tokio::time::sleep(delay).await;
    }
}
