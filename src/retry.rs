//! Run-level retry for source acquisition
//!
//! A download of the statistics dataset can hit a throttled or briefly unavailable
//! endpoint. [`with_retry`] repeats the acquisition with exponential backoff and gives
//! up early when the pipeline's cancellation token fires, including in the middle of
//! a backoff pause.
//!
//! Delivery does not go through here: the delivery engine retries each item exactly
//! once with no delay.
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use traffic_relay::config::{RetryConfig, SourceConfig};
//! use traffic_relay::retry::with_retry;
//! use traffic_relay::source::acquire_raw_records;
//!
//! # async fn example() -> traffic_relay::Result<()> {
//! let source = SourceConfig::default();
//! let cancel = CancellationToken::new();
//! let rows = with_retry(&RetryConfig::default(), &cancel, || acquire_raw_records(&source)).await?;
//! println!("{} raw rows", rows.len());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Throttling and server-side failures usually clear up
            Error::SourceStatus { status, .. } => *status == 429 || *status >= 500,
            Error::Config { .. }
            | Error::MalformedRecord(_)
            | Error::InvalidDocument(_)
            | Error::Serialization(_)
            | Error::Cancelled => false,
        }
    }
}

/// Delay schedule for successive retries
///
/// Each pause is the previous one times the multiplier, capped at `max_delay`. A
/// product that does not fit in a [`Duration`] also lands on the cap.
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    remaining: u32,
}

impl Backoff {
    /// Schedule described by `config`, allowing `config.max_attempts` retries
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            max: config.max_delay,
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            remaining: config.max_attempts,
        }
    }

    /// Pause before the next retry, or None once retries are used up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));

        Some(if self.jitter { spread(base) } else { base })
    }
}

/// Stretch `delay` by a random factor in [1, 2] so parallel runs do not retry in step
fn spread(delay: Duration) -> Duration {
    let factor = 1.0 + rand::thread_rng().gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
}

/// Run `operation` until it succeeds, fails permanently, runs out of retries, or
/// `cancel` fires
///
/// The operation runs at most `config.max_attempts + 1` times.
///
/// # Errors
///
/// Returns the last error of the operation, or [`Error::Cancelled`] when the token
/// fires before or during an attempt or a backoff pause.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(config);
    let mut attempt: u32 = 1;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = operation() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "source acquired after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::error!(error = %error, code = error.error_code(), "source acquisition failed");
            return Err(error);
        }

        let Some(delay) = backoff.next_delay() else {
            tracing::error!(error = %error, attempts = attempt, "source acquisition gave up");
            return Err(error);
        };

        tracing::warn!(
            error = %error,
            attempt,
            delay_ms = delay.as_millis(),
            "source acquisition failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(attempt, "retry abandoned, run cancelled");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
