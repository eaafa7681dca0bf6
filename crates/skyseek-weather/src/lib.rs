//! Weather service for SkySeek
//!
//! Client for an OpenWeather-compatible API: current conditions by coordinates
//! or by place name, plus a short-term 3-hourly forecast.

pub mod client;
pub mod types;

pub use client::{OpenWeatherClient, WeatherApi};
pub use types::*;
