//! Location record type.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo;

fn default_active() -> bool {
    true
}

/// One point of interest (an airport).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Stable unique identifier, e.g. the 4-letter ICAO code
    pub id: String,
    /// Short public code (3-letter IATA), may be empty
    #[serde(default)]
    pub display_code: String,
    /// Human-readable label
    pub name: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// ISO 3166-1 alpha-2 country code, may be empty
    #[serde(default)]
    pub country_code: String,
    /// Inactive records are skipped by lookups
    #[serde(default = "default_active")]
    pub active: bool,
}

impl LocationRecord {
    /// Create an active record with no display or country code.
    pub fn new(id: impl Into<String>, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            display_code: String::new(),
            name: name.into(),
            latitude,
            longitude,
            country_code: String::new(),
            active: true,
        }
    }

    pub fn with_display_code(mut self, code: impl Into<String>) -> Self {
        self.display_code = code.into();
        self
    }

    pub fn with_country(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Case-insensitive exact match on the country code
    pub fn in_country(&self, code: &str) -> bool {
        !self.country_code.is_empty() && self.country_code.eq_ignore_ascii_case(code)
    }

    /// Reject records the store must never hold.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRecord {
                id: self.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if !geo::is_valid_coordinate(self.latitude, self.longitude) {
            return Err(Error::InvalidRecord {
                id: self.id.clone(),
                reason: format!(
                    "coordinates out of range ({}, {})",
                    self.latitude, self.longitude
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_builder() {
        let rec = LocationRecord::new("KELP", "El Paso Intl", 31.8072, -106.3778)
            .with_display_code("ELP")
            .with_country("US");
        assert_eq!(rec.display_code, "ELP");
        assert!(rec.active);
        assert!(rec.in_country("us"));
        assert!(!rec.in_country("MX"));
    }

    #[test]
    fn test_empty_country_never_matches() {
        let rec = LocationRecord::new("XXXX", "Nowhere", 0.0, 0.0);
        assert!(!rec.in_country(""));
    }

    #[test]
    fn test_deserialize_defaults() {
        let rec: LocationRecord = serde_json::from_str(
            r#"{"id":"MMCS","name":"Ciudad Juarez Intl","latitude":31.6361,"longitude":-106.429}"#,
        )
        .unwrap();
        assert!(rec.active);
        assert!(rec.display_code.is_empty());
        assert!(rec.country_code.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(LocationRecord::new("KELP", "El Paso", 31.8, -106.4).validate().is_ok());
        assert_matches!(
            LocationRecord::new("BAD1", "Bad", 91.0, 0.0).validate(),
            Err(Error::InvalidRecord { id, .. }) if id == "BAD1"
        );
        assert_matches!(
            LocationRecord::new(" ", "Blank", 0.0, 0.0).validate(),
            Err(Error::InvalidRecord { .. })
        );
    }
}
