//! Place search: input guard, staged geo lookups, weather validation.

pub mod cache;
pub mod candidate;
pub mod error;
pub mod guard;
pub mod log;
pub mod orchestrator;
pub mod retry;
pub mod validator;

pub use cache::{GeoCache, Stage, ValidationCache};
pub use candidate::{Candidate, CandidateKind, ValidationKey, ValidationState};
pub use error::SearchError;
pub use guard::{check_query, is_valid_query, GibberishPattern, QueryRejection};
pub use log::{LogEntry, LogLevel, SearchLog};
pub use orchestrator::{SearchOrchestrator, SearchSnapshot, SearchStatus};
pub use retry::{with_retry, RetryConfig};
pub use validator::WeatherValidator;
