//! Retry utilities for remote lookups with backoff.
//!
//! This module provides retry logic for transient failures:
//! - Timeouts
//! - 5xx server errors, 408 and 429
//! - Connection failures and resets
//!
//! It does NOT retry:
//! - Missing documents (404)
//! - Other 4xx client errors and malformed requests

use std::future::Future;
use std::time::Duration;

use gridcast_core::ResolverConfig;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Retry `n` waits `n` units before running
    pub backoff_unit: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_unit: Duration::from_millis(backoff_unit_ms),
            ..Self::default()
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.max_attempts, config.retry_backoff_ms)
    }

    /// Wait before retry number `retry` (1 for the second attempt).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(retry)
            .min(self.max_delay)
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Should retry the request
    Retry,
    /// Should not retry - permanent failure for this key
    NoRetry,
}

/// Check if a reqwest error is retryable
pub fn is_retryable_error(error: &reqwest::Error) -> RetryDecision {
    if error.is_timeout() {
        tracing::debug!("Request timed out, will retry");
        return RetryDecision::Retry;
    }

    if error.is_connect() {
        tracing::debug!("Connection error, will retry");
        return RetryDecision::Retry;
    }

    // Request could not even be built
    if error.is_builder() {
        tracing::debug!("Request construction failed, not retryable");
        return RetryDecision::NoRetry;
    }

    if let Some(status) = error.status() {
        return is_retryable_status(status);
    }

    // Resets and other mid-flight failures
    RetryDecision::Retry
}

/// Check if a status code is retryable
pub fn is_retryable_status(status: StatusCode) -> RetryDecision {
    if status.is_server_error() {
        tracing::debug!("Server error ({}), will retry", status);
        return RetryDecision::Retry;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::debug!("Rate limited (429), will retry");
        return RetryDecision::Retry;
    }

    if status == StatusCode::REQUEST_TIMEOUT {
        tracing::debug!("Request timeout (408), will retry");
        return RetryDecision::Retry;
    }

    RetryDecision::NoRetry
}

/// Why [`with_retry`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The token fired during an attempt or a backoff wait.
    Cancelled,
    /// The last error seen, either non-retryable or after the final attempt.
    Failed(E),
}

/// Run `operation` until it succeeds, fails permanently, runs out of
/// attempts or `cancel` fires.
///
/// `operation` receives the zero-based attempt number. Backoff waits are
/// async sleeps and race against the token.
pub async fn with_retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryDecision,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for_retry(attempt);
            tracing::info!(
                "Retry attempt {} of {}, waiting {:?}",
                attempt + 1,
                max_attempts,
                delay
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("Request succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if classify(&e) == RetryDecision::NoRetry {
                    tracing::debug!("Non-retryable error: {}", e);
                    return Err(RetryError::Failed(e));
                }

                if attempt >= max_attempts {
                    tracing::error!("All {} attempts exhausted: {}", max_attempts, e);
                    return Err(RetryError::Failed(e));
                }

                tracing::warn!(
                    "Retryable error on attempt {} of {}: {}",
                    attempt,
                    max_attempts,
                    e
                );
            }
        }
    }
}
