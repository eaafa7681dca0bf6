//! Multi-stage search with progressive weather validation.
//!
//! Each call to [`SearchOrchestrator::perform_search`] starts a new
//! generation and cancels the previous one. Results are published through a
//! `watch` channel; every write compares the writer's generation with the
//! published one inside the same `send_if_modified` call, so work belonging to
//! a superseded search can never overwrite newer state.
//!
//! Stages run in order and a stage only runs while nothing has been found:
//! prefix cities, prefix countries, exact cities, exact countries. Candidates
//! are published as `Validating` as soon as a stage returns, then validated in
//! tracked background tasks. The terminal status is published once the stage
//! loop is done and every validation task of the generation has finished.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use skyseek_core::Config;
use skyseek_geo::{GeoApi, GeoError};
use skyseek_weather::WeatherApi;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::cache::{GeoCache, Stage};
use crate::candidate::{sort_candidates, Candidate, ValidationState};
use crate::error::SearchError;
use crate::guard::check_query;
use crate::log::{LogEntry, SearchLog};
use crate::retry::{with_retry, RetryConfig};
use crate::validator::WeatherValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    #[default]
    Idle,
    Fetching,
    Success,
    NoResults,
    Error,
}

impl SearchStatus {
    /// Idle or terminal
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Fetching)
    }
}

/// Published search state
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchSnapshot {
    pub generation: u64,
    pub query: String,
    pub status: SearchStatus,
    /// Always sorted: validated, validating, the rest
    pub suggestions: Vec<Candidate>,
    /// Short user-facing message when `status` is `Error`
    pub error: Option<String>,
}

struct ActiveSearch {
    generation: u64,
    /// Whole generation: stage lookups and validations
    cancel: CancellationToken,
    /// Child of `cancel`, background validations only
    validations: CancellationToken,
}

struct Inner {
    geo: Arc<dyn GeoApi>,
    validator: WeatherValidator,
    retry: RetryConfig,
    geo_cache: GeoCache,
    state: watch::Sender<SearchSnapshot>,
    active: Mutex<Option<ActiveSearch>>,
    drivers: TaskTracker,
    log: SearchLog,
}

/// Search front door; cheap to clone
#[derive(Clone)]
pub struct SearchOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.state.borrow();
        f.debug_struct("SearchOrchestrator")
            .field("generation", &snapshot.generation)
            .field("status", &snapshot.status)
            .finish_non_exhaustive()
    }
}

impl SearchOrchestrator {
    pub fn new(geo: Arc<dyn GeoApi>, weather: Arc<dyn WeatherApi>, config: &Config) -> Self {
        let (state, _) = watch::channel(SearchSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                geo,
                validator: WeatherValidator::new(weather, config.weather.coordinate_tolerance_deg),
                retry: RetryConfig::new(config.search.max_attempts),
                geo_cache: GeoCache::new(),
                state,
                active: Mutex::new(None),
                drivers: TaskTracker::new(),
                log: SearchLog::new(config.search.log_capacity),
            }),
        }
    }

    /// Start a search for `query`, superseding any search in progress.
    ///
    /// Returns immediately; observe progress through [`subscribe`](Self::subscribe)
    /// or [`settled`](Self::settled). Must be called from within a Tokio runtime.
    /// Whitespace-only text clears the search; any other text goes through
    /// the query guard as given, surrounding whitespace included.
    pub fn perform_search(&self, query: &str) {
        let inner = &self.inner;
        let mut active = inner.active.lock();
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
        }

        if query.trim().is_empty() {
            let generation = inner.reset("", SearchStatus::Idle, None);
            inner.log.info(generation, "Query cleared");
            return;
        }

        if let Err(rejection) = check_query(query) {
            let err = SearchError::from(rejection);
            let generation = inner.reset(query, SearchStatus::Error, Some(err.user_message()));
            inner
                .log
                .warn(generation, format!("Rejected \"{}\": {}", query, rejection));
            return;
        }

        let generation = inner.reset(query, SearchStatus::Fetching, None);
        inner.log.info(generation, format!("Searching for \"{}\"", query));

        let cancel = CancellationToken::new();
        let validations = cancel.child_token();
        *active = Some(ActiveSearch {
            generation,
            cancel: cancel.clone(),
            validations: validations.clone(),
        });

        let driver = Arc::clone(inner).drive(generation, query.to_string(), cancel, validations);
        inner.drivers.spawn(driver);
    }

    /// Reset to idle with no suggestions, cancelling any search in progress
    pub fn clear_search(&self) {
        self.perform_search("");
    }

    /// Re-validate `candidate` on selection, bypassing the validation cache.
    ///
    /// Background validations of the current search are cancelled first; the
    /// candidate's badge is updated if it is still listed.
    pub async fn validate_and_select(&self, candidate: &Candidate) -> bool {
        let inner = &self.inner;
        let generation = {
            let active = inner.active.lock();
            if let Some(active) = active.as_ref() {
                active.validations.cancel();
            }
            inner.state.borrow().generation
        };

        let valid = inner
            .validator
            .revalidate(candidate, &CancellationToken::new())
            .await;

        let badge = if valid {
            ValidationState::Validated
        } else {
            ValidationState::Rejected
        };
        inner.set_badge(generation, &candidate.id, badge);
        if valid {
            inner
                .log
                .info(generation, format!("Selected {}", candidate.display_name));
        } else {
            inner.log.warn(
                generation,
                format!("{} has no weather data", candidate.display_name),
            );
        }
        valid
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.inner.state.subscribe()
    }

    /// Wait until the latest search is idle or has reached a terminal status
    pub async fn settled(&self) -> SearchSnapshot {
        let mut rx = self.inner.state.subscribe();
        let result = rx.wait_for(|s| s.status.is_settled()).await;
        match result {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Diagnostic log, oldest first
    pub fn log(&self) -> Vec<LogEntry> {
        self.inner.log.entries()
    }

    /// Cancel the active search and wait for all of its tasks to finish.
    ///
    /// A search that had not settled is left idle with no suggestions.
    pub async fn shutdown(&self) {
        let cancelled = self.inner.active.lock().take().map(|active| {
            active.cancel.cancel();
            self.inner.log.info(active.generation, "Shutting down");
            active.generation
        });
        self.inner.drivers.close();
        self.inner.drivers.wait().await;
        self.inner.drivers.reopen();

        if let Some(generation) = cancelled {
            self.inner.update(generation, |s| {
                if s.status.is_settled() {
                    return false;
                }
                s.status = SearchStatus::Idle;
                s.suggestions.clear();
                true
            });
        }
    }
}

impl Inner {
    /// Start a new generation with a fresh snapshot and return its number
    fn reset(&self, query: &str, status: SearchStatus, error: Option<&str>) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| {
            s.generation += 1;
            s.query = query.to_string();
            s.status = status;
            s.suggestions.clear();
            s.error = error.map(str::to_string);
            generation = s.generation;
        });
        generation
    }

    /// Apply `f` if `generation` is still current; returns whether it was
    fn update(&self, generation: u64, f: impl FnOnce(&mut SearchSnapshot) -> bool) -> bool {
        let mut current = false;
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            current = true;
            f(s)
        });
        current
    }

    fn set_badge(&self, generation: u64, id: &str, badge: ValidationState) {
        self.update(generation, |s| {
            let Some(candidate) = s.suggestions.iter_mut().find(|c| c.id == id) else {
                return false;
            };
            // An interrupted validation only clears a pending badge
            if badge == ValidationState::Unvalidated
                && candidate.validation_state != ValidationState::Validating
            {
                return false;
            }
            candidate.validation_state = badge;
            sort_candidates(&mut s.suggestions);
            true
        });
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        query: String,
        cancel: CancellationToken,
        validations: CancellationToken,
    ) {
        let tracker = TaskTracker::new();
        let stages = tokio::spawn(Arc::clone(&self).run_stages(
            generation,
            query,
            cancel.clone(),
            validations.clone(),
            tracker.clone(),
        ));

        let outcome = match stages.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_cancelled() => Err(None),
            Ok(Err(e)) => Err(Some(SearchError::Lookup(e))),
            Err(join_err) if join_err.is_panic() => Err(Some(SearchError::Internal(
                "search task panicked".to_string(),
            ))),
            Err(_) => Err(None),
        };

        if let Err(Some(_)) = &outcome {
            validations.cancel();
        }
        tracker.close();
        tracker.wait().await;

        if cancel.is_cancelled() {
            return;
        }

        match outcome {
            Ok(()) => self.finish(generation),
            Err(Some(err)) => self.fail(generation, err),
            Err(None) => {}
        }
    }

    async fn run_stages(
        self: Arc<Self>,
        generation: u64,
        query: String,
        cancel: CancellationToken,
        validations: CancellationToken,
        tracker: TaskTracker,
    ) -> Result<(), GeoError> {
        let mut seen: HashSet<String> = HashSet::new();

        for stage in Stage::ALL {
            if !seen.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                return Err(GeoError::Cancelled);
            }

            let fetched = match self.fetch_stage(stage, &query, &cancel).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if e.is_retryable() => {
                    self.log
                        .warn(generation, format!("{} gave up: {}", stage, e));
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            if cancel.is_cancelled() {
                return Err(GeoError::Cancelled);
            }

            let fresh: Vec<Candidate> = fetched
                .into_iter()
                .filter(|c| seen.insert(c.id.clone()))
                .map(|mut c| {
                    c.validation_state = ValidationState::Validating;
                    c
                })
                .collect();

            self.log.info(
                generation,
                format!("{}: {} new suggestion(s)", stage, fresh.len()),
            );
            if fresh.is_empty() {
                continue;
            }

            let published = self.update(generation, |s| {
                s.suggestions.extend(fresh.iter().cloned());
                sort_candidates(&mut s.suggestions);
                true
            });
            if !published {
                return Err(GeoError::Cancelled);
            }

            for candidate in fresh {
                self.spawn_validation(generation, candidate, &validations, &tracker);
            }
        }

        Ok(())
    }

    async fn fetch_stage(
        &self,
        stage: Stage,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Candidate>, GeoError> {
        let geo = self.geo.as_ref();
        match stage {
            Stage::PrefixCities | Stage::ExactCities => {
                if let Some(hit) = self.geo_cache.cities(stage, query) {
                    tracing::debug!("{} cache hit for {}", stage, query);
                    return Ok(hit.into_iter().map(Candidate::from).collect());
                }
                let records = with_retry(&self.retry, cancel, stage.label(), || match stage {
                    Stage::PrefixCities => geo.prefix_cities(query, cancel),
                    _ => geo.exact_cities(query, cancel),
                })
                .await?;
                self.geo_cache.insert_cities(stage, query, records.clone());
                Ok(records.into_iter().map(Candidate::from).collect())
            }
            Stage::PrefixCountries | Stage::ExactCountries => {
                if let Some(hit) = self.geo_cache.countries(stage, query) {
                    tracing::debug!("{} cache hit for {}", stage, query);
                    return Ok(hit.into_iter().map(Candidate::from).collect());
                }
                let records = with_retry(&self.retry, cancel, stage.label(), || match stage {
                    Stage::PrefixCountries => geo.prefix_countries(query, cancel),
                    _ => geo.exact_countries(query, cancel),
                })
                .await?;
                self.geo_cache.insert_countries(stage, query, records.clone());
                Ok(records.into_iter().map(Candidate::from).collect())
            }
        }
    }

    fn spawn_validation(
        self: &Arc<Self>,
        generation: u64,
        candidate: Candidate,
        validations: &CancellationToken,
        tracker: &TaskTracker,
    ) {
        let inner = Arc::clone(self);
        let cancel = validations.clone();
        tracker.spawn(async move {
            let valid = inner.validator.validate_cached(&candidate, &cancel).await;
            let badge = if cancel.is_cancelled() {
                ValidationState::Unvalidated
            } else if valid {
                ValidationState::Validated
            } else {
                ValidationState::Rejected
            };
            inner.set_badge(generation, &candidate.id, badge);
        });
    }

    fn finish(&self, generation: u64) {
        let mut found = 0;
        let current = self.update(generation, |s| {
            found = s.suggestions.len();
            s.status = if found == 0 {
                SearchStatus::NoResults
            } else {
                SearchStatus::Success
            };
            true
        });
        if current {
            if found == 0 {
                self.log.info(generation, "No results");
            } else {
                self.log
                    .info(generation, format!("Done: {} suggestion(s)", found));
            }
        }
    }

    fn fail(&self, generation: u64, err: SearchError) {
        let message = err.user_message();
        let current = self.update(generation, |s| {
            s.status = SearchStatus::Error;
            s.error = Some(message.to_string());
            true
        });
        if current {
            self.log.error(generation, err.to_string());
        }
    }
}
