//! Retry with exponential backoff, and deadlines for blocking calls

use crate::config::RetryConfig;
use crate::error::{RemoteError, Result};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder, backoff::Backoff};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry a fallible operation with exponential backoff
pub fn retry_with_backoff<F, T>(config: &RetryConfig, operation_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = create_backoff(config);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match f() {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if attempts >= config.max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "Operation failed after maximum retries"
                    );
                    return Err(RemoteError::retry_exhausted(
                        operation_name,
                        attempts,
                        err.to_string(),
                    ));
                }

                let Some(duration) = backoff.next_backoff() else {
                    return Err(RemoteError::retry_exhausted(
                        operation_name,
                        attempts,
                        err.to_string(),
                    ));
                };
                debug!(
                    operation = operation_name,
                    attempts = attempts,
                    error = %err,
                    retry_in_ms = duration.as_millis(),
                    "Operation failed, retrying"
                );
                std::thread::sleep(duration);
            }
        }
    }
}

/// Create exponential backoff from config
fn create_backoff(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
        .with_max_interval(Duration::from_millis(config.max_backoff_ms))
        .with_multiplier(config.backoff_multiplier)
        .with_max_elapsed_time(None) // We use max_attempts instead
        .build()
}

/// Run a blocking operation on a worker thread, giving up after `timeout`
///
/// A timed-out worker is abandoned, not cancelled; its result is discarded.
pub fn run_with_timeout<F, T>(timeout: Duration, operation_name: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    std::thread::Builder::new()
        .name(format!("buildstash-{operation_name}"))
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| RemoteError::io(e, "", format!("spawn {operation_name} worker")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(RemoteError::timeout(
            operation_name,
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(RemoteError::connection_failed(
            operation_name,
            "worker exited without a result",
        )),
    }
}
