//! Unified suggestion model built from geo records.

use std::cmp::Ordering;

use serde::Serialize;
use skyseek_geo::{CityRecord, CountryRecord};
use skyseek_weather::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    City,
    Country,
}

/// Weather-validation badge of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Unvalidated,
    Validating,
    Validated,
    Rejected,
}

impl ValidationState {
    fn rank(self) -> u8 {
        match self {
            Self::Validated => 0,
            Self::Validating => 1,
            Self::Unvalidated | Self::Rejected => 2,
        }
    }

    pub fn badge(self) -> &'static str {
        match self {
            Self::Unvalidated => " ",
            Self::Validating => "…",
            Self::Validated => "✓",
            Self::Rejected => "✗",
        }
    }
}

/// A city or country suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Unique within one search generation
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub kind: CandidateKind,
    pub country_code: Option<String>,
    pub country: Option<String>,
    /// Weather lookup proxy for countries
    pub capital: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub validation_state: ValidationState,
}

impl From<CityRecord> for Candidate {
    fn from(city: CityRecord) -> Self {
        let display_name = match city.country.as_deref() {
            Some(country) if !country.trim().is_empty() => format!("{}, {}", city.name, country),
            _ => city.name.clone(),
        };
        let coordinates = match (city.latitude, city.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        };

        Self {
            id: format!("city-{}", city.id),
            name: city.name,
            display_name,
            kind: CandidateKind::City,
            country_code: city.country_code,
            country: city.country,
            capital: None,
            coordinates,
            validation_state: ValidationState::Unvalidated,
        }
    }
}

impl From<CountryRecord> for Candidate {
    fn from(country: CountryRecord) -> Self {
        Self {
            id: format!("country-{}", country.code),
            display_name: country.name.clone(),
            name: country.name,
            kind: CandidateKind::Country,
            country_code: None,
            country: None,
            capital: country.capital,
            coordinates: None,
            validation_state: ValidationState::Unvalidated,
        }
    }
}

impl Candidate {
    /// Name a country is looked up by: the capital when known, else the country itself
    pub fn lookup_name(&self) -> &str {
        match self.capital.as_deref() {
            Some(capital) if !capital.trim().is_empty() => capital,
            _ => &self.name,
        }
    }

    /// Key under which this candidate's validation result is cached
    pub fn validation_key(&self) -> Option<ValidationKey> {
        match self.kind {
            CandidateKind::City => self.coordinates.map(|c| ValidationKey::City {
                lat: (c.lat * 100.0).round() as i64,
                lon: (c.lon * 100.0).round() as i64,
            }),
            CandidateKind::Country => Some(ValidationKey::Country(
                self.lookup_name().trim().to_lowercase(),
            )),
        }
    }
}

/// Cache key for validation results: coordinates rounded to two decimals, or a lowercased name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationKey {
    City { lat: i64, lon: i64 },
    Country(String),
}

/// Validated first, then validating, then the rest; ties by case-insensitive display name
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    a.validation_state
        .rank()
        .cmp(&b.validation_state.rank())
        .then_with(|| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
        })
}

pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city(id: i64, name: &str, lat: Option<f64>) -> CityRecord {
        CityRecord {
            id,
            name: name.to_string(),
            country: Some("Indonesia".to_string()),
            country_code: Some("ID".to_string()),
            region: None,
            latitude: lat,
            longitude: lat.map(|_| 106.82),
            population: Some(10_000_000),
        }
    }

    #[test]
    fn test_city_conversion() {
        let c = Candidate::from(city(42, "Jakarta", Some(-6.2)));
        assert_eq!(c.id, "city-42");
        assert_eq!(c.display_name, "Jakarta, Indonesia");
        assert_eq!(c.kind, CandidateKind::City);
        assert_eq!(c.coordinates, Some(Coordinates::new(-6.2, 106.82)));
        assert_eq!(
            c.validation_key(),
            Some(ValidationKey::City { lat: -620, lon: 10682 })
        );

        let no_coords = Candidate::from(city(43, "Nowhere", None));
        assert_eq!(no_coords.validation_key(), None);
    }

    #[test]
    fn test_country_lookup_name() {
        let mut c = Candidate::from(CountryRecord {
            code: "FR".to_string(),
            name: "France".to_string(),
            capital: Some("Paris".to_string()),
        });
        assert_eq!(c.id, "country-FR");
        assert_eq!(c.lookup_name(), "Paris");
        assert_eq!(c.validation_key(), Some(ValidationKey::Country("paris".to_string())));

        c.capital = Some("  ".to_string());
        assert_eq!(c.lookup_name(), "France");
    }

    #[test]
    fn test_sort_order() {
        let mut list: Vec<Candidate> = ["delta", "Alpha", "charlie", "Bravo"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut c = Candidate::from(CountryRecord {
                    code: i.to_string(),
                    name: name.to_string(),
                    capital: None,
                });
                c.validation_state = match i {
                    0 => ValidationState::Validated,
                    1 => ValidationState::Rejected,
                    2 => ValidationState::Validating,
                    _ => ValidationState::Unvalidated,
                };
                c
            })
            .collect();

        sort_candidates(&mut list);
        let names: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["delta", "charlie", "Alpha", "Bravo"]);
    }
}
