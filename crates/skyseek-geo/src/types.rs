use std::time::Duration;

use serde::{Deserialize, Serialize};
use skyseek_core::NetworkError;
use thiserror::Error;

/// City record as returned by the geo API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub population: Option<u64>,
}

/// Country record as returned by the geo API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub capital: Option<String>,
}

/// Envelope of every list endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct ApiList<T> {
    pub data: Vec<T>,
}

/// Request families are spaced independently of each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestFamily {
    CitiesPrefix,
    CountriesPrefix,
    CitiesExact,
    CountriesExact,
}

impl RequestFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CitiesPrefix => "cities-prefix",
            Self::CountriesPrefix => "countries-prefix",
            Self::CitiesExact => "cities-exact",
            Self::CountriesExact => "countries-exact",
        }
    }
}

impl std::fmt::Display for RequestFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geo client errors
#[derive(Debug, Clone, Error)]
pub enum GeoError {
    #[error("Geo request failed: {0}")]
    Network(#[from] NetworkError),

    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Malformed geo response: {0}")]
    Parse(String),

    #[error("Geo request cancelled")]
    Cancelled,
}

impl GeoError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Server-provided wait before retrying, if any
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_ms } if *retry_after_ms > 0 => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(e) => e.user_message(),
            Self::RateLimited { .. } => "Too many lookups. Please wait a moment.",
            Self::Parse(_) => "The place lookup service returned unexpected data.",
            Self::Cancelled => "Lookup cancelled.",
        }
    }
}

/// Case-insensitive "equal to or starts with"
pub(crate) fn matches_exact_or_prefix(name: &str, query: &str) -> bool {
    let name = name.to_lowercase();
    let query = query.trim().to_lowercase();
    name == query || name.starts_with(&query)
}
