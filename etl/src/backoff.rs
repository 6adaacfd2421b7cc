//! Capped exponential retry for operations that fail on transient errors.
//!
//! The delay before retry `n` (0-indexed) is `start * factor^n`, clamped to `border`. With the
//! default configuration the schedule is 0.1s, 0.2s, 0.4s, ... 6.4s, then 10s forever.
//! Retries never give up; only a shutdown request interrupts the loop.

use std::future::Future;
use std::time::Duration;

use config::shared::BackoffConfig;
use tracing::{info, warn};

use crate::concurrency::shutdown::{ShutdownRx, sleep_or_shutdown};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;

#[derive(Debug, Clone)]
pub struct Backoff {
    start_ms: u64,
    factor: f64,
    border_ms: u64,
    shutdown_rx: Option<ShutdownRx>,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            start_ms: config.start_ms,
            factor: config.factor,
            border_ms: config.border_ms,
            shutdown_rx: None,
        }
    }

    /// Lets a shutdown request cut a pending backoff sleep short.
    ///
    /// An interrupted retry returns an [`ErrorKind::RetryInterrupted`] error wrapping the
    /// last failure.
    pub fn with_shutdown(mut self, shutdown_rx: ShutdownRx) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Returns the delay applied after the `attempt`-th consecutive failure (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = (self.start_ms as f64 * self.factor.powi(exponent)).min(self.border_ms as f64);

        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Runs `operation` until it succeeds, retrying transient failures.
    ///
    /// Errors whose kind is not [`ErrorKind::is_transient`] are returned immediately.
    pub async fn retry<T, F, Fut>(&self, operation: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        self.retry_if(operation, EtlError::is_transient).await
    }

    /// Same as [`Backoff::retry`] with a custom retryable class.
    pub async fn retry_if<T, F, Fut, P>(&self, mut operation: F, should_retry: P) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
        P: Fn(&EtlError) -> bool,
    {
        let mut attempt: u32 = 0;

        loop {
            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "operation succeeded after retrying");
                    }

                    return Ok(value);
                }
                Err(err) if should_retry(&err) => err,
                Err(err) => return Err(err),
            };

            let delay = self.delay(attempt);
            warn!(
                error = %err,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "operation failed, retrying after backoff"
            );

            match &self.shutdown_rx {
                Some(shutdown_rx) => {
                    let mut shutdown_rx = shutdown_rx.clone();
                    if sleep_or_shutdown(&mut shutdown_rx, delay)
                        .await
                        .should_shutdown()
                    {
                        return Err(etl_error!(
                            ErrorKind::RetryInterrupted,
                            "Retry interrupted by shutdown",
                            source: err
                        ));
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            attempt = attempt.saturating_add(1);
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;

    #[test]
    fn default_schedule_caps_at_border() {
        let backoff = Backoff::default();
        let schedule: Vec<u64> = (0..10)
            .map(|n| backoff.delay(n).as_millis() as u64)
            .collect();

        assert_eq!(
            schedule,
            vec![100, 200, 400, 800, 1600, 3200, 6400, 10_000, 10_000, 10_000]
        );
    }

    #[test]
    fn huge_attempt_numbers_stay_at_border() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = Backoff::default()
            .retry(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(etl_error!(
                            ErrorKind::SourceConnectionFailed,
                            "PostgreSQL connection failed"
                        ))
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 0.1 + 0.2 + 0.4 seconds of backoff.
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);

        let result: EtlResult<()> = Backoff::default()
            .retry(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(etl_error!(ErrorKind::SourceQueryFailed, "PostgreSQL query failed")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::SourceQueryFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_selects_retryable_errors() {
        let calls = AtomicU32::new(0);

        let result = Backoff::default()
            .retry_if(
                || {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt == 0 {
                            Err(etl_error!(ErrorKind::SourceQueryFailed, "PostgreSQL query failed"))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |err| err.kind() == ErrorKind::SourceQueryFailed,
            )
            .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff_sleep() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let backoff = Backoff::default().with_shutdown(shutdown_rx);

        let retry = tokio::spawn(async move {
            backoff
                .retry(|| async {
                    Err::<(), _>(etl_error!(
                        ErrorKind::SourceConnectionFailed,
                        "PostgreSQL connection failed"
                    ))
                })
                .await
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown_tx.shutdown();

        let err = retry.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetryInterrupted);
    }
}
