//! Location-suggestion client for SkySeek
//!
//! Prefix and exact-match city/country lookups against the GeoDB API, with
//! per-family request spacing and a shared cooldown after rate-limit replies.

pub mod client;
pub mod rate_limit;
pub mod types;

pub use client::{GeoApi, GeoDbClient};
pub use rate_limit::{cooldown_from_headers, RateLimiter};
pub use types::{CityRecord, CountryRecord, GeoError, RequestFamily};
