use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use skyseek_core::NetworkError;

/// Weather condition categories mapped from provider condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert an OpenWeather condition id to WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_owm_id(id: u16) -> Self {
        match id {
            200..=299 => Self::Thunderstorm,
            300..=399 => Self::Drizzle,
            500 | 501 | 520 | 521 => Self::Rain,
            502..=504 | 522 | 531 => Self::HeavyRain,
            511 => Self::Sleet, // Freezing rain
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            700..=799 => Self::Fog,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear, // 800 and unknown ids
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }

    /// Icon name used by front-ends
    pub fn icon_name(&self) -> &'static str {
        match self {
            Self::Clear => "sun",
            Self::PartlyCloudy => "cloud_sun",
            Self::Cloudy => "cloud",
            Self::Fog => "cloud_fog",
            Self::Drizzle | Self::Rain | Self::HeavyRain => "cloud_rain",
            Self::Snow | Self::Sleet => "cloud_snow",
            Self::Thunderstorm => "cloud_lightning",
        }
    }
}

/// Geographic point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both axes differ by at most `tolerance` degrees
    pub fn within(&self, other: &Coordinates, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() <= tolerance && (self.lon - other.lon).abs() <= tolerance
    }

    /// Whether the point lies on the globe
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One entry of the provider's condition list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: u16,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

/// Current-conditions response as returned by the provider.
///
/// Every field is optional: the search validator decides whether an
/// observation is complete enough to back a suggestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Observation {
    pub conditions: Vec<Condition>,
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<u8>,
    pub wind_speed: Option<f64>,
    pub coordinates: Option<Coordinates>,
    pub name: Option<String>,
    pub country: Option<String>,
}

impl Observation {
    /// Non-empty condition list, numeric temperature and coordinates, non-blank name
    pub fn is_usable(&self) -> bool {
        !self.conditions.is_empty()
            && self.temperature.is_some()
            && self.coordinates.is_some()
            && self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

/// Current weather ready for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub location_name: String,
    pub country: Option<String>,
    pub coordinates: Coordinates,
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub humidity: Option<u8>,
    pub wind_speed: Option<f64>,
    pub condition: WeatherCondition,
    pub description: String,
    pub fetched_at: DateTime<Utc>,
}

impl TryFrom<Observation> for CurrentWeather {
    type Error = WeatherError;

    fn try_from(obs: Observation) -> Result<Self, Self::Error> {
        if !obs.is_usable() {
            return Err(WeatherError::Parse(
                "Observation is missing conditions, temperature, coordinates or name".into(),
            ));
        }
        let first = obs.conditions.first();
        let (condition, description) = match first {
            Some(c) => (WeatherCondition::from_owm_id(c.id), c.description.clone()),
            None => (WeatherCondition::Clear, String::new()),
        };

        Ok(Self {
            location_name: obs.name.unwrap_or_default(),
            country: obs.country,
            coordinates: obs.coordinates.unwrap_or(Coordinates::new(0.0, 0.0)),
            temperature: obs.temperature.unwrap_or_default(),
            feels_like: obs.feels_like,
            humidity: obs.humidity,
            wind_speed: obs.wind_speed,
            condition,
            description,
            fetched_at: Utc::now(),
        })
    }
}

/// One 3-hour forecast step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub condition: WeatherCondition,
    pub precipitation_chance: u8,
}

/// Daily rollup of forecast entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub condition: WeatherCondition,
    pub precipitation_chance: u8,
}

/// Short-term forecast bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub location_name: String,
    pub coordinates: Option<Coordinates>,
    /// Offset from UTC in seconds, used to bucket entries into local days
    pub utc_offset_secs: i32,
    pub entries: Vec<ForecastEntry>,
}

impl Forecast {
    /// Group entries by local calendar day, in chronological order.
    ///
    /// The day's condition is the most frequent one, earliest wins ties.
    pub fn daily(&self) -> Vec<DaySummary> {
        let offset = chrono::Duration::seconds(i64::from(self.utc_offset_secs));
        let mut days: Vec<(NaiveDate, Vec<&ForecastEntry>)> = Vec::new();

        for entry in &self.entries {
            let date = (entry.time + offset).date_naive();
            match days.iter_mut().find(|(d, _)| *d == date) {
                Some((_, bucket)) => bucket.push(entry),
                None => days.push((date, vec![entry])),
            }
        }

        days.into_iter()
            .map(|(date, bucket)| {
                let high = bucket
                    .iter()
                    .map(|e| e.temp_max)
                    .fold(f64::NEG_INFINITY, f64::max);
                let low = bucket
                    .iter()
                    .map(|e| e.temp_min)
                    .fold(f64::INFINITY, f64::min);
                let precipitation_chance = bucket
                    .iter()
                    .map(|e| e.precipitation_chance)
                    .max()
                    .unwrap_or(0);

                let mut counts: Vec<(WeatherCondition, usize)> = Vec::new();
                for e in &bucket {
                    match counts.iter_mut().find(|(c, _)| *c == e.condition) {
                        Some((_, n)) => *n += 1,
                        None => counts.push((e.condition, 1)),
                    }
                }
                // max_by_key keeps the last maximum, so scan in reverse
                let condition = counts
                    .iter()
                    .rev()
                    .max_by_key(|(_, n)| *n)
                    .map(|(c, _)| *c)
                    .unwrap_or_default();

                DaySummary {
                    date,
                    high,
                    low,
                    condition,
                    precipitation_chance,
                }
            })
            .collect()
    }
}

/// Weather provider errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("No weather data for {0}")]
    NotFound(String),
    #[error("Weather API rate limit exceeded")]
    RateLimited,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid coordinates: latitude must be -90 to 90, longitude must be -180 to 180")]
    InvalidCoordinates,
    #[error("Weather request cancelled")]
    Cancelled,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::Network(e) => e.user_message(),
            WeatherError::NotFound(_) => "No weather data for that place.",
            WeatherError::RateLimited => "Weather service is busy. Please try again shortly.",
            WeatherError::Parse(_) => "Weather service returned unexpected data.",
            WeatherError::InvalidCoordinates => "That location has invalid coordinates.",
            WeatherError::Cancelled => "Request cancelled.",
        }
    }
}

/// Deserialize a number, mapping anything non-numeric to `None`
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}
