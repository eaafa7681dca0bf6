//! Session caches shared by every search generation.
//!
//! Nothing is evicted: entries live as long as the orchestrator.

use std::collections::HashMap;

use parking_lot::Mutex;
use skyseek_geo::{CityRecord, CountryRecord};

use crate::candidate::ValidationKey;

/// One of the four lookup strategies, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PrefixCities,
    PrefixCountries,
    ExactCities,
    ExactCountries,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Self::PrefixCities,
        Self::PrefixCountries,
        Self::ExactCities,
        Self::ExactCountries,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::PrefixCities => "prefix cities",
            Self::PrefixCountries => "prefix countries",
            Self::ExactCities => "exact cities",
            Self::ExactCountries => "exact countries",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

type GeoKey = (Stage, String);

fn geo_key(stage: Stage, query: &str) -> GeoKey {
    (stage, query.trim().to_lowercase())
}

/// Raw geo results per (stage, normalised query)
#[derive(Debug, Default)]
pub struct GeoCache {
    cities: Mutex<HashMap<GeoKey, Vec<CityRecord>>>,
    countries: Mutex<HashMap<GeoKey, Vec<CountryRecord>>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cities(&self, stage: Stage, query: &str) -> Option<Vec<CityRecord>> {
        self.cities.lock().get(&geo_key(stage, query)).cloned()
    }

    pub fn insert_cities(&self, stage: Stage, query: &str, records: Vec<CityRecord>) {
        self.cities.lock().insert(geo_key(stage, query), records);
    }

    pub fn countries(&self, stage: Stage, query: &str) -> Option<Vec<CountryRecord>> {
        self.countries.lock().get(&geo_key(stage, query)).cloned()
    }

    pub fn insert_countries(&self, stage: Stage, query: &str, records: Vec<CountryRecord>) {
        self.countries.lock().insert(geo_key(stage, query), records);
    }

    pub fn len(&self) -> usize {
        self.cities.lock().len() + self.countries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validation outcomes; facts about places, so shared across generations
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: Mutex<HashMap<ValidationKey, bool>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ValidationKey) -> Option<bool> {
        self.entries.lock().get(key).copied()
    }

    pub fn insert(&self, key: ValidationKey, valid: bool) {
        self.entries.lock().insert(key, valid);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
