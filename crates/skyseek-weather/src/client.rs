//! OpenWeather HTTP client
//!
//! All requests race against a caller-supplied cancellation token and carry a
//! client-level timeout; a timeout surfaces as a retryable network error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use skyseek_core::{NetworkError, ReqwestErrorExt, TemperatureUnit, WeatherConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::types::{
    lenient_f64, Condition, Coordinates, Forecast, ForecastEntry, Observation, WeatherCondition,
    WeatherError,
};

/// Current-conditions lookups used to validate search candidates
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Current weather at a point
    async fn current_by_coords(
        &self,
        coords: Coordinates,
        cancel: &CancellationToken,
    ) -> Result<Observation, WeatherError>;

    /// Current weather for a free-text place name (city, capital, country)
    async fn current_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Observation, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    #[serde(default)]
    weather: Vec<Condition>,
    main: Option<ApiMain>,
    coord: Option<ApiCoord>,
    wind: Option<ApiWind>,
    sys: Option<ApiSys>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    #[serde(default, deserialize_with = "lenient_f64")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    temp_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    temp_max: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiCoord {
    #[serde(default, deserialize_with = "lenient_f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    lon: Option<f64>,
}

impl ApiCoord {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.lat?, self.lon?))
    }
}

#[derive(Debug, Deserialize)]
struct ApiWind {
    #[serde(default, deserialize_with = "lenient_f64")]
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiSys {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    #[serde(default)]
    list: Vec<ApiForecastItem>,
    city: Option<ApiCity>,
}

#[derive(Debug, Deserialize)]
struct ApiForecastItem {
    dt: i64,
    main: ApiMain,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pop: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiCity {
    #[serde(default)]
    name: String,
    coord: Option<ApiCoord>,
    #[serde(default)]
    timezone: i32,
}

impl From<ApiCurrent> for Observation {
    fn from(api: ApiCurrent) -> Self {
        let main = api.main.as_ref();
        Self {
            conditions: api.weather,
            temperature: main.and_then(|m| m.temp),
            feels_like: main.and_then(|m| m.feels_like),
            humidity: main
                .and_then(|m| m.humidity)
                .map(|h| h.clamp(0.0, 100.0) as u8),
            wind_speed: api.wind.and_then(|w| w.speed),
            coordinates: api.coord.as_ref().and_then(ApiCoord::coordinates),
            name: api.name,
            country: api.sys.and_then(|s| s.country),
        }
    }
}

/// OpenWeather HTTP client implementation
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    config: WeatherConfig,
}

impl OpenWeatherClient {
    /// Create a new client with the given configuration
    pub fn new(config: WeatherConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        Ok(Self { client, config })
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.config.temperature_unit
    }

    fn validate_coordinates(coords: &Coordinates) -> Result<(), WeatherError> {
        if !coords.is_valid() {
            return Err(WeatherError::InvalidCoordinates);
        }
        Ok(())
    }

    /// Run `fut` unless `cancel` fires first
    async fn cancellable<T>(
        cancel: &CancellationToken,
        fut: impl std::future::Future<Output = Result<T, WeatherError>>,
    ) -> Result<T, WeatherError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WeatherError::Cancelled),
            res = fut => res,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        subject: &str,
    ) -> Result<T, WeatherError> {
        let url = format!("{}/{}", self.config.base_url, endpoint);
        debug!("GET {} for {}", url, subject);

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[
                ("appid", self.config.api_key.as_str()),
                ("units", self.config.temperature_unit.api_units()),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WeatherError::NotFound(subject.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(WeatherError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Network(NetworkError::Status {
                status: status.as_u16(),
                message,
            }));
        }

        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;
        serde_json::from_str(&body).map_err(|e| WeatherError::Parse(e.to_string()))
    }

    /// Fetch the short-term 3-hourly forecast at a point
    #[instrument(skip(self, cancel), fields(lat = %coords.lat, lon = %coords.lon))]
    pub async fn forecast_by_coords(
        &self,
        coords: Coordinates,
        cancel: &CancellationToken,
    ) -> Result<Forecast, WeatherError> {
        Self::validate_coordinates(&coords)?;

        let params = [
            ("lat", coords.lat.to_string()),
            ("lon", coords.lon.to_string()),
            ("cnt", self.config.forecast_entries.to_string()),
        ];
        let subject = format!("{:.2},{:.2}", coords.lat, coords.lon);
        let api: ApiForecast =
            Self::cancellable(cancel, self.get_json("forecast", &params, &subject)).await?;

        let entries = api
            .list
            .into_iter()
            .filter_map(|item| {
                let time = DateTime::<Utc>::from_timestamp(item.dt, 0)?;
                let temperature = item.main.temp?;
                Some(ForecastEntry {
                    time,
                    temperature,
                    temp_min: item.main.temp_min.unwrap_or(temperature),
                    temp_max: item.main.temp_max.unwrap_or(temperature),
                    condition: item
                        .weather
                        .first()
                        .map(|c| WeatherCondition::from_owm_id(c.id))
                        .unwrap_or_default(),
                    precipitation_chance: (item.pop.unwrap_or(0.0).clamp(0.0, 1.0) * 100.0)
                        .round() as u8,
                })
            })
            .collect();

        let (location_name, forecast_coords, utc_offset_secs) = match api.city {
            Some(city) => {
                let c = city.coord.as_ref().and_then(ApiCoord::coordinates);
                (city.name, c, city.timezone)
            }
            None => (String::new(), None, 0),
        };

        Ok(Forecast {
            location_name,
            coordinates: forecast_coords.or(Some(coords)),
            utc_offset_secs,
            entries,
        })
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    #[instrument(skip(self, cancel), fields(lat = %coords.lat, lon = %coords.lon))]
    async fn current_by_coords(
        &self,
        coords: Coordinates,
        cancel: &CancellationToken,
    ) -> Result<Observation, WeatherError> {
        Self::validate_coordinates(&coords)?;

        let params = [("lat", coords.lat.to_string()), ("lon", coords.lon.to_string())];
        let subject = format!("{:.2},{:.2}", coords.lat, coords.lon);
        let api: ApiCurrent =
            Self::cancellable(cancel, self.get_json("weather", &params, &subject)).await?;
        Ok(api.into())
    }

    #[instrument(skip(self, cancel))]
    async fn current_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Observation, WeatherError> {
        let params = [("q", name.trim().to_string())];
        let api: ApiCurrent =
            Self::cancellable(cancel, self.get_json("weather", &params, name)).await?;
        Ok(api.into())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenWeatherClient {
        OpenWeatherClient::new(WeatherConfig {
            base_url: base_url.to_string(),
            api_key: "test_key".to_string(),
            ..WeatherConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(OpenWeatherClient::validate_coordinates(&Coordinates::new(52.52, 13.41)).is_ok());
        assert!(OpenWeatherClient::validate_coordinates(&Coordinates::new(91.0, 0.0)).is_err());
        assert!(OpenWeatherClient::validate_coordinates(&Coordinates::new(0.0, -181.0)).is_err());
    }

    #[test]
    fn test_api_current_with_non_numeric_temp() {
        let api: ApiCurrent = serde_json::from_value(serde_json::json!({
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
            "main": {"temp": "warm"},
            "coord": {"lat": 1.0, "lon": 2.0},
            "name": "Somewhere"
        }))
        .unwrap();
        let obs: Observation = api.into();
        assert_eq!(obs.temperature, None);
        assert!(!obs.is_usable());
    }

    #[test]
    fn test_api_current_partial_coord() {
        let api: ApiCurrent = serde_json::from_value(serde_json::json!({
            "weather": [{"id": 800}],
            "main": {"temp": 12.0},
            "coord": {"lat": 1.0},
            "name": "Somewhere"
        }))
        .unwrap();
        let obs: Observation = api.into();
        assert_eq!(obs.coordinates, None);
    }

    #[tokio::test]
    async fn test_current_by_name_sends_key_and_units() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("q", "Paris"))
            .and(query_param("appid", "test_key"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "coord": {"lon": 2.35, "lat": 48.85},
                "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
                "main": {"temp": 14.2, "feels_like": 13.1, "humidity": 71},
                "wind": {"speed": 4.1},
                "sys": {"country": "FR"},
                "name": "Paris"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let obs = client
            .current_by_name("Paris", &CancellationToken::new())
            .await
            .unwrap();

        assert!(obs.is_usable());
        assert_eq!(obs.name.as_deref(), Some("Paris"));
        assert_eq!(obs.country.as_deref(), Some("FR"));
        assert_eq!(obs.humidity, Some(71));
        assert_eq!(obs.coordinates, Some(Coordinates::new(48.85, 2.35)));
    }

    #[tokio::test]
    async fn test_not_found_maps_to_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "cod": "404", "message": "city not found"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client
            .current_by_name("Atlantis", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(WeatherError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_server_error_carries_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client
            .current_by_coords(Coordinates::new(1.0, 2.0), &CancellationToken::new())
            .await;
        match result {
            Err(WeatherError::Network(e)) => assert_eq!(e.status(), Some(502)),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let result = client
            .current_by_name("Paris", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(WeatherError::Parse(_))));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(&mock_server.uri());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = client.current_by_name("Paris", &cancel).await;
        assert!(matches!(result, Err(WeatherError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_invalid_coordinates_skip_network() {
        let client = test_client("http://127.0.0.1:9");
        let result = client
            .current_by_coords(Coordinates::new(100.0, 0.0), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(WeatherError::InvalidCoordinates)));
    }
}
