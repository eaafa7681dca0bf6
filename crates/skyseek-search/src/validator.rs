//! Weather-backed candidate validation.

use std::sync::Arc;

use skyseek_weather::{WeatherApi, WeatherError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::ValidationCache;
use crate::candidate::{Candidate, CandidateKind};

/// Confirms a candidate resolves to real weather data
pub struct WeatherValidator {
    api: Arc<dyn WeatherApi>,
    tolerance_deg: f64,
    cache: ValidationCache,
}

impl WeatherValidator {
    pub fn new(api: Arc<dyn WeatherApi>, tolerance_deg: f64) -> Self {
        Self {
            api,
            tolerance_deg,
            cache: ValidationCache::new(),
        }
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Definitive answer, or the error that prevented one.
    ///
    /// A 404 from the weather source is a definitive "no".
    async fn check(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> Result<bool, WeatherError> {
        let outcome = match candidate.kind {
            CandidateKind::City => {
                let Some(expected) = candidate.coordinates else {
                    return Ok(false);
                };
                self.api
                    .current_by_coords(expected, cancel)
                    .await
                    .map(|obs| {
                        obs.is_usable()
                            && obs
                                .coordinates
                                .is_some_and(|c| c.within(&expected, self.tolerance_deg))
                    })
            }
            CandidateKind::Country => self
                .api
                .current_by_name(candidate.lookup_name(), cancel)
                .await
                .map(|obs| obs.is_usable()),
        };

        match outcome {
            Err(WeatherError::NotFound(_) | WeatherError::InvalidCoordinates) => Ok(false),
            other => other,
        }
    }

    /// Never fails: anything short of a confirmed observation is `false`
    pub async fn validate(&self, candidate: &Candidate, cancel: &CancellationToken) -> bool {
        match self.check(candidate, cancel).await {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Validation of {} failed: {}", candidate.id, e);
                false
            }
        }
    }

    /// Cached validation; only definitive answers are stored
    pub async fn validate_cached(&self, candidate: &Candidate, cancel: &CancellationToken) -> bool {
        let key = candidate.validation_key();
        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            return hit;
        }

        match self.check(candidate, cancel).await {
            Ok(valid) => {
                if let Some(key) = key {
                    self.cache.insert(key, valid);
                }
                valid
            }
            Err(e) => {
                debug!("Validation of {} failed: {}", candidate.id, e);
                false
            }
        }
    }

    /// Re-check ignoring the cache, then refresh the entry
    pub async fn revalidate(&self, candidate: &Candidate, cancel: &CancellationToken) -> bool {
        match self.check(candidate, cancel).await {
            Ok(valid) => {
                if let Some(key) = candidate.validation_key() {
                    self.cache.insert(key, valid);
                }
                valid
            }
            Err(e) => {
                debug!("Re-validation of {} failed: {}", candidate.id, e);
                false
            }
        }
    }
}
