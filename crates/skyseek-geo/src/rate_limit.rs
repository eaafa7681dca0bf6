//! Client-side request pacing for the geo API.
//!
//! Two rules apply before every call:
//! - calls of the same [`RequestFamily`] are at least `min_spacing` apart,
//!   independent of other families
//! - after a rate-limit reply, every family waits out a shared cooldown

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::types::{GeoError, RequestFamily};

const RETRY_AFTER: &str = "retry-after";
const QUOTA_RESET: &str = "x-ratelimit-requests-reset";

#[derive(Debug, Default)]
struct LimiterState {
    cooldown_until: Option<Instant>,
    last_call: HashMap<RequestFamily, Instant>,
}

/// Per-family spacing plus a global cooldown window
#[derive(Debug)]
pub struct RateLimiter {
    min_spacing: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Wait until a call of `family` may be issued.
    ///
    /// The slot is reserved before sleeping, so concurrent callers of one
    /// family queue up `min_spacing` apart.
    pub async fn acquire(
        &self,
        family: RequestFamily,
        cancel: &CancellationToken,
    ) -> Result<(), GeoError> {
        let slot = {
            let mut state = self.state.lock();
            let mut slot = Instant::now();
            if let Some(last) = state.last_call.get(&family) {
                slot = slot.max(*last + self.min_spacing);
            }
            if let Some(until) = state.cooldown_until {
                slot = slot.max(until);
            }
            state.last_call.insert(family, slot);
            slot
        };

        if slot > Instant::now() {
            tracing::debug!(
                "Pacing {} request for {:?}",
                family,
                slot.saturating_duration_since(Instant::now())
            );
            Self::sleep_until(slot, cancel).await?;
        }

        // A cooldown may have started while this call was queued
        loop {
            let until = self.state.lock().cooldown_until;
            match until {
                Some(until) if until > Instant::now() => {
                    Self::sleep_until(until, cancel).await?;
                }
                _ => break,
            }
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        let last = state.last_call.entry(family).or_insert(now);
        if *last < now {
            *last = now;
        }
        Ok(())
    }

    /// Pause every family until `now + duration` (never shortens an active cooldown)
    pub fn start_cooldown(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.state.lock();
        let extended = match state.cooldown_until {
            Some(existing) if existing >= until => existing,
            _ => until,
        };
        state.cooldown_until = Some(extended);
        tracing::warn!("Geo API cooldown for {:?}", duration);
    }

    /// Time left in the current cooldown, zero if none
    pub fn cooldown_remaining(&self) -> Duration {
        self.state
            .lock()
            .cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    async fn sleep_until(deadline: Instant, cancel: &CancellationToken) -> Result<(), GeoError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GeoError::Cancelled),
            _ = sleep_until(deadline) => Ok(()),
        }
    }
}

/// Cooldown for a rate-limit reply.
///
/// Priority: `Retry-After`, then the quota-reset hint, then `default`.
/// The result never exceeds `max`.
pub fn cooldown_from_headers(headers: &HeaderMap, default: Duration, max: Duration) -> Duration {
    header_secs(headers, RETRY_AFTER)
        .or_else(|| header_secs(headers, QUOTA_RESET))
        .map(|secs| Duration::from_secs_f64(secs.min(max.as_secs_f64())))
        .unwrap_or(default)
        .min(max)
}

/// Non-negative finite seconds from a numeric header
fn header_secs(headers: &HeaderMap, name: &str) -> Option<f64> {
    let secs: f64 = headers.get(name)?.to_str().ok()?.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}
