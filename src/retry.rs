//! Retry with exponential backoff for transient fetch failures
//!
//! Segment fetches hit flaky CDN edges: timeouts, connection resets, the
//! occasional 500. Those are worth retrying with exponential backoff and
//! jitter; everything else fails fast.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::Error;

/// Classifies an error as transient (retry) or permanent (fail fast)
pub trait IsRetryable {
    /// True when the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            // Server-side trouble and throttling pass; client errors are final
            Error::Status { code, .. } => *code >= 500 || *code == 429,
            Error::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Cancellation must propagate immediately
            Error::Cancelled => false,
            _ => false,
        }
    }
}

/// Run `operation` up to `config.max_attempts` times total.
///
/// Delays grow by `backoff_multiplier` per retry, capped at `max_delay`,
/// with optional jitter on top. A non-retryable error or an exhausted
/// budget returns the last error. `max_attempts` of zero still runs the
/// operation once.
pub async fn with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let budget = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if err.is_retryable() && attempt < budget => {
                tracing::warn!(
                    error = %err,
                    attempt,
                    budget,
                    delay_ms = delay.as_millis(),
                    "transient failure, retrying"
                );

                let sleep_for = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(sleep_for).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!(error = %err, attempts = attempt, "retry budget exhausted");
                } else {
                    tracing::error!(error = %err, "permanent failure, not retrying");
                }
                return Err(err);
            }
        }
    }
}

/// Uniform jitter between 0% and 100% of the delay, so concurrent workers
/// retrying the same flaky edge do not stampede in lockstep.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
