//! GeoDB HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use skyseek_core::{GeoConfig, NetworkError, ReqwestErrorExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::rate_limit::{cooldown_from_headers, RateLimiter};
use crate::types::{matches_exact_or_prefix, ApiList, CityRecord, CountryRecord, GeoError, RequestFamily};

const PREFIX_CITY_LIMIT: usize = 10;
const PREFIX_COUNTRY_LIMIT: usize = 5;
const EXACT_FETCH_LIMIT: usize = 10;
const EXACT_CITY_LIMIT: usize = 5;
const EXACT_COUNTRY_LIMIT: usize = 3;

/// Location-suggestion lookups.
///
/// Every call honors `cancel`: a cancelled call returns [`GeoError::Cancelled`].
#[async_trait]
pub trait GeoApi: Send + Sync {
    /// Cities whose name starts with `query`, population-filtered, at most 10
    async fn prefix_cities(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CityRecord>, GeoError>;

    /// Countries whose name starts with `query`, at most 5
    async fn prefix_countries(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CountryRecord>, GeoError>;

    /// Cities named exactly `query` or starting with it, at most 5
    async fn exact_cities(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CityRecord>, GeoError>;

    /// Countries named exactly `query` or starting with it, at most 3
    async fn exact_countries(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CountryRecord>, GeoError>;
}

pub struct GeoDbClient {
    client: Client,
    config: GeoConfig,
    limiter: RateLimiter,
}

impl std::fmt::Debug for GeoDbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoDbClient")
            .field("base_url", &self.config.base_url)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl GeoDbClient {
    pub fn new(config: GeoConfig) -> Result<Self, GeoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeoError::Network(e.into_network_error()))?;
        let limiter = RateLimiter::new(Duration::from_millis(config.min_request_spacing_ms));

        Ok(Self {
            client,
            config,
            limiter,
        })
    }

    /// Time left before any geo call may be issued after a rate-limit reply
    pub fn cooldown_remaining(&self) -> Duration {
        self.limiter.cooldown_remaining()
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        family: RequestFamily,
        endpoint: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, GeoError> {
        self.limiter.acquire(family, cancel).await?;

        let url = format!("{}/{}", self.config.base_url, endpoint);
        tracing::debug!("GET {} ({})", url, family);

        let request = self
            .client
            .get(&url)
            .header("X-RapidAPI-Key", &self.config.api_key)
            .header("X-RapidAPI-Host", &self.config.api_host)
            .query(params)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GeoError::Cancelled),
            res = request => res.map_err(|e| GeoError::Network(e.into_network_error()))?,
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let cooldown = cooldown_from_headers(
                response.headers(),
                Duration::from_millis(self.config.default_cooldown_ms),
                Duration::from_millis(self.config.max_cooldown_ms),
            );
            self.limiter.start_cooldown(cooldown);
            return Err(GeoError::RateLimited {
                retry_after_ms: cooldown.as_millis() as u64,
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!("{} returned {}: {}", family, status, message);
            return Err(GeoError::Network(NetworkError::Status {
                status: status.as_u16(),
                message,
            }));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GeoError::Cancelled),
            res = response.text() => res.map_err(|e| GeoError::Network(e.into_network_error()))?,
        };
        let list: ApiList<T> =
            serde_json::from_str(&body).map_err(|e| GeoError::Parse(e.to_string()))?;
        Ok(list.data)
    }

    fn city_params(query: &str, limit: usize, min_population: u64) -> Vec<(&'static str, String)> {
        vec![
            ("namePrefix", query.trim().to_string()),
            ("limit", limit.to_string()),
            ("minPopulation", min_population.to_string()),
            ("sort", "-population".to_string()),
            ("types", "CITY".to_string()),
        ]
    }

    fn country_params(query: &str, limit: usize) -> Vec<(&'static str, String)> {
        vec![
            ("namePrefix", query.trim().to_string()),
            ("limit", limit.to_string()),
        ]
    }
}

#[async_trait]
impl GeoApi for GeoDbClient {
    #[instrument(skip(self, cancel), level = "info")]
    async fn prefix_cities(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CityRecord>, GeoError> {
        let params =
            Self::city_params(query, PREFIX_CITY_LIMIT, self.config.prefix_min_population);
        let mut cities: Vec<CityRecord> = self
            .fetch(RequestFamily::CitiesPrefix, "cities", &params, cancel)
            .await?;
        cities.truncate(PREFIX_CITY_LIMIT);
        Ok(cities)
    }

    #[instrument(skip(self, cancel), level = "info")]
    async fn prefix_countries(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CountryRecord>, GeoError> {
        let params = Self::country_params(query, PREFIX_COUNTRY_LIMIT);
        let mut countries: Vec<CountryRecord> = self
            .fetch(RequestFamily::CountriesPrefix, "countries", &params, cancel)
            .await?;
        countries.truncate(PREFIX_COUNTRY_LIMIT);
        Ok(countries)
    }

    #[instrument(skip(self, cancel), level = "info")]
    async fn exact_cities(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CityRecord>, GeoError> {
        let params =
            Self::city_params(query, EXACT_FETCH_LIMIT, self.config.exact_min_population);
        let cities: Vec<CityRecord> = self
            .fetch(RequestFamily::CitiesExact, "cities", &params, cancel)
            .await?;
        Ok(cities
            .into_iter()
            .filter(|c| matches_exact_or_prefix(&c.name, query))
            .take(EXACT_CITY_LIMIT)
            .collect())
    }

    #[instrument(skip(self, cancel), level = "info")]
    async fn exact_countries(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CountryRecord>, GeoError> {
        let params = Self::country_params(query, EXACT_FETCH_LIMIT);
        let countries: Vec<CountryRecord> = self
            .fetch(RequestFamily::CountriesExact, "countries", &params, cancel)
            .await?;
        Ok(countries
            .into_iter()
            .filter(|c| matches_exact_or_prefix(&c.name, query))
            .take(EXACT_COUNTRY_LIMIT)
            .collect())
    }
}
