//! Retry with exponential backoff for geo lookups.
//!
//! Retried:
//! - rate-limit replies, honouring the server's wait hint
//! - network failures (timeouts, connection errors, error statuses)
//!
//! Not retried:
//! - malformed responses
//! - cancellation, which returns immediately and does not use up an attempt

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use skyseek_geo::GeoError;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const RATE_LIMIT_BASE_MS: u64 = 500;
const RATE_LIMIT_JITTER_MS: u64 = 250;
const RATE_LIMIT_CAP_MS: u64 = 5000;

const ERROR_BASE_MS: u64 = 300;
const ERROR_JITTER_MS: u64 = 150;
const ERROR_CAP_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Error classification for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

pub fn retry_decision(error: &GeoError) -> RetryDecision {
    if error.is_retryable() {
        RetryDecision::Retry
    } else {
        RetryDecision::NoRetry
    }
}

/// Wait after failed attempt `attempt` (0-based), with `jitter_ms` already drawn
pub fn backoff_delay(error: &GeoError, attempt: u32, jitter_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let ms = match error.retry_hint() {
        Some(hint) => (hint.as_millis() as u64).min(RATE_LIMIT_CAP_MS),
        None if matches!(error, GeoError::RateLimited { .. }) => RATE_LIMIT_BASE_MS
            .saturating_mul(factor)
            .saturating_add(jitter_ms)
            .min(RATE_LIMIT_CAP_MS),
        None => ERROR_BASE_MS
            .saturating_mul(factor)
            .saturating_add(jitter_ms)
            .min(ERROR_CAP_MS),
    };
    Duration::from_millis(ms)
}

fn jitter_for(error: &GeoError) -> u64 {
    let max = if matches!(error, GeoError::RateLimited { .. }) {
        RATE_LIMIT_JITTER_MS
    } else {
        ERROR_JITTER_MS
    };
    rand::rng().random_range(0..=max)
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// Returns the last error when every attempt failed.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    mut operation: F,
) -> Result<T, GeoError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeoError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("{} succeeded after {} retries", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if error.is_cancelled() || retry_decision(&error) == RetryDecision::NoRetry {
            tracing::debug!("{}: not retrying: {}", label, error);
            return Err(error);
        }

        if attempt + 1 >= max_attempts {
            tracing::warn!("{}: all {} attempts failed: {}", label, max_attempts, error);
            return Err(error);
        }

        let delay = backoff_delay(&error, attempt, jitter_for(&error));
        tracing::warn!(
            "{}: attempt {} of {} failed ({}), retrying in {:?}",
            label,
            attempt + 1,
            max_attempts,
            error,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GeoError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use skyseek_core::NetworkError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited(ms: u64) -> GeoError {
        GeoError::RateLimited { retry_after_ms: ms }
    }

    fn server_error() -> GeoError {
        GeoError::Network(NetworkError::Status {
            status: 503,
            message: String::new(),
        })
    }

    #[test]
    fn test_rate_limit_delay_uses_hint_capped() {
        assert_eq!(backoff_delay(&rate_limited(2000), 0, 99), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&rate_limited(9000), 0, 0), Duration::from_millis(5000));
    }

    #[test]
    fn test_rate_limit_without_hint() {
        assert_eq!(backoff_delay(&rate_limited(0), 0, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(&rate_limited(0), 1, 250), Duration::from_millis(1250));
        assert_eq!(backoff_delay(&rate_limited(0), 4, 0), Duration::from_millis(5000));
    }

    #[test]
    fn test_error_delay_schedule() {
        assert_eq!(backoff_delay(&server_error(), 0, 0), Duration::from_millis(300));
        assert_eq!(backoff_delay(&server_error(), 1, 150), Duration::from_millis(750));
        assert_eq!(backoff_delay(&server_error(), 2, 0), Duration::from_millis(1200));
        assert_eq!(backoff_delay(&server_error(), 5, 0), Duration::from_millis(3000));
    }

    #[test]
    fn test_decisions() {
        assert_eq!(retry_decision(&server_error()), RetryDecision::Retry);
        assert_eq!(retry_decision(&rate_limited(1)), RetryDecision::Retry);
        assert_eq!(retry_decision(&GeoError::Parse("x".into())), RetryDecision::NoRetry);
        assert_eq!(retry_decision(&GeoError::Cancelled), RetryDecision::NoRetry);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_rate_limit_hint() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_retry(&RetryConfig::default(), &CancellationToken::new(), "t", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(rate_limited(2000))
                } else {
                    Ok(start.elapsed())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(result >= Duration::from_millis(2000));
        assert!(result < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&RetryConfig::default(), &CancellationToken::new(), "t", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;

        assert!(matches!(result, Err(GeoError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> =
            with_retry(&RetryConfig::default(), &CancellationToken::new(), "t", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GeoError::Parse("bad".into())) }
            })
            .await;

        assert!(matches!(result, Err(GeoError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = with_retry(&RetryConfig::default(), &cancel, "t", || async {
            Err(rate_limited(4000))
        })
        .await;
        assert!(matches!(result, Err(GeoError::Cancelled)));
    }
}
