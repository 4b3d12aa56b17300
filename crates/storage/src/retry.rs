//! Exponential-backoff retry policy for transient storage errors (spec §7).
//!
//! Wraps only the `Transient` branch of the error taxonomy: input errors
//! (`DimensionMismatch`, ...) and logical errors (`NotFound`, ...) are
//! never retried, and the index engine never calls through this module at
//! all (it is pure compute, per spec §7's propagation policy). Only the
//! storage-adapter boundary retries.

use std::future::Future;
use std::time::Duration;
use vg_core::{Error, Result};

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(200);
/// Ceiling on any single delay, regardless of attempt count.
pub const MAX_DELAY: Duration = Duration::from_secs(30);
/// Maximum number of attempts (the original call plus up to this many retries).
pub const MAX_ATTEMPTS: u32 = 5;

/// Run `op`, retrying with full-jitter exponential backoff while the
/// returned error is retryable ([`Error::is_retryable`]), up to
/// [`MAX_ATTEMPTS`] total attempts. The first non-retryable error, or the
/// last retryable error once attempts are exhausted, is returned as-is.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = backoff_delay(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying transient storage error");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Full-jitter delay for the given 1-based attempt number.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(MAX_DELAY.as_millis());
    let jittered = (rand_fraction() * capped as f64) as u64;
    Duration::from_millis(jittered.max(1))
}

/// A small dependency-free source of jitter. Not cryptographic; retry
/// jitter has no security requirement, only a scheduling-fairness one.
fn rand_fraction() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    (nanos % 1_000_000) as f64 / 1_000_000.0
}

/// Construct the terminal [`Error::StorageUnavailable`] surfaced once
/// retries are exhausted, wrapping the last transient error as its cause.
pub fn exhausted(last: Error) -> Error {
    Error::StorageUnavailable {
        message: format!("retries exhausted: {last}"),
        cause: Some(Box::new(last)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Transient { message: "boom".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound { entity: "x".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
