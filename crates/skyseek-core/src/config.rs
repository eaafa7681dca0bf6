use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable overriding `geo.api_key`
pub const GEO_API_KEY_ENV: &str = "SKYSEEK_GEO_API_KEY";
/// Environment variable overriding `weather.api_key`
pub const WEATHER_API_KEY_ENV: &str = "SKYSEEK_WEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Location-suggestion API settings
    #[serde(default)]
    pub geo: GeoConfig,

    /// Weather API settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Search orchestration settings
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Base URL of the geo API, without trailing slash
    #[serde(default = "default_geo_base_url")]
    pub base_url: String,

    /// Value of the provider host header
    #[serde(default = "default_geo_api_host")]
    pub api_host: String,

    /// Provider key (can be set via `SKYSEEK_GEO_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum gap between two calls of the same request family
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u64,

    /// Cooldown used when a 429 carries no hint
    #[serde(default = "default_cooldown_ms")]
    pub default_cooldown_ms: u64,

    /// Upper bound for any cooldown
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,

    /// Population floor for prefix city lookups
    #[serde(default = "default_prefix_min_population")]
    pub prefix_min_population: u64,

    /// Population floor for exact city lookups
    #[serde(default = "default_exact_min_population")]
    pub exact_min_population: u64,
}

fn default_geo_base_url() -> String {
    "https://wft-geo-db.p.rapidapi.com/v1/geo".to_string()
}

fn default_geo_api_host() -> String {
    "wft-geo-db.p.rapidapi.com".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_min_request_spacing_ms() -> u64 {
    1100
}

fn default_cooldown_ms() -> u64 {
    1500
}

fn default_max_cooldown_ms() -> u64 {
    5000
}

fn default_prefix_min_population() -> u64 {
    1000
}

fn default_exact_min_population() -> u64 {
    10_000
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            base_url: default_geo_base_url(),
            api_host: default_geo_api_host(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            min_request_spacing_ms: default_min_request_spacing_ms(),
            default_cooldown_ms: default_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            prefix_min_population: default_prefix_min_population(),
            exact_min_population: default_exact_min_population(),
        }
    }
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Auto,
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Value of the weather API `units` query parameter
    pub fn api_units(&self) -> &'static str {
        match self {
            TemperatureUnit::Auto | TemperatureUnit::Celsius => "metric",
            TemperatureUnit::Fahrenheit => "imperial",
        }
    }

    /// Display suffix for temperatures returned in this unit
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Auto | TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the weather API, without trailing slash
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,

    /// API key (can be set via `SKYSEEK_WEATHER_API_KEY`)
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Temperature unit preference
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,

    /// Max distance in degrees between a city candidate and the weather station
    #[serde(default = "default_coordinate_tolerance")]
    pub coordinate_tolerance_deg: f64,

    /// Number of 3-hour forecast entries to request
    #[serde(default = "default_forecast_entries")]
    pub forecast_entries: u8,
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_coordinate_tolerance() -> f64 {
    0.5
}

fn default_forecast_entries() -> u8 {
    16
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            temperature_unit: TemperatureUnit::Auto,
            coordinate_tolerance_deg: default_coordinate_tolerance(),
            forecast_entries: default_forecast_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Attempts per geo stage before the stage counts as empty
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Number of diagnostic log entries kept in memory
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_log_capacity() -> usize {
    200
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults if the file doesn't exist.
    ///
    /// API keys from the environment take precedence over the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(GEO_API_KEY_ENV) {
            if !key.trim().is_empty() {
                tracing::debug!("Using geo API key from {}", GEO_API_KEY_ENV);
                self.geo.api_key = key;
            }
        }
        if let Ok(key) = std::env::var(WEATHER_API_KEY_ENV) {
            if !key.trim().is_empty() {
                tracing::debug!("Using weather API key from {}", WEATHER_API_KEY_ENV);
                self.weather.api_key = key;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_url(&self.geo.base_url, "geo.base_url", &mut result);
        Self::validate_url(&self.weather.base_url, "weather.base_url", &mut result);

        if self.geo.api_key.trim().is_empty() {
            result.add_warning(
                "geo.api_key",
                format!("No geo API key configured (set {})", GEO_API_KEY_ENV),
            );
        }
        if self.weather.api_key.trim().is_empty() {
            result.add_warning(
                "weather.api_key",
                format!("No weather API key configured (set {})", WEATHER_API_KEY_ENV),
            );
        }

        if self.geo.timeout_secs == 0 {
            result.add_error("geo.timeout_secs", "Timeout must be greater than 0");
        } else if !(10..=20).contains(&self.geo.timeout_secs) {
            result.add_warning("geo.timeout_secs", "Timeout outside the usual 10-20s range");
        }
        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        }

        if self.geo.max_cooldown_ms < self.geo.default_cooldown_ms {
            result.add_error(
                "geo.max_cooldown_ms",
                "Maximum cooldown must not be below the default cooldown",
            );
        }

        let tolerance = self.weather.coordinate_tolerance_deg;
        if !(tolerance > 0.0 && tolerance <= 10.0) {
            result.add_error(
                "weather.coordinate_tolerance_deg",
                "Tolerance must be in (0, 10] degrees",
            );
        }

        if self.weather.forecast_entries == 0 {
            result.add_warning("weather.forecast_entries", "Forecast disabled (0 entries)");
        }

        if self.search.max_attempts == 0 {
            result.add_error("search.max_attempts", "At least one attempt is required");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("skyseek");

        Ok(config_dir.join("config.toml"))
    }
}
