//! Haversine distance and unit conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Earth mean radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Statute miles per kilometre
pub const KM_TO_MI: f64 = 0.621371;

/// Great-circle distance in kilometres between two points given in degrees.
///
/// Symmetric in its arguments and exactly zero for identical points.
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Convert kilometres to statute miles.
#[inline]
pub fn km_to_mi(km: f64) -> f64 {
    km * KM_TO_MI
}

/// Convert statute miles to kilometres.
#[inline]
pub fn mi_to_km(mi: f64) -> f64 {
    mi / KM_TO_MI
}

/// Unit a caller wants distances reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    /// Kilometres
    #[default]
    Km,
    /// Statute miles
    Mi,
}

impl DistanceUnit {
    /// Short lowercase code used in cache keys and query strings
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceUnit::Km => "km",
            DistanceUnit::Mi => "mi",
        }
    }

    /// Express a kilometre distance in this unit
    pub fn from_km(&self, km: f64) -> f64 {
        match self {
            DistanceUnit::Km => km,
            DistanceUnit::Mi => km_to_mi(km),
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "km" => Ok(DistanceUnit::Km),
            "mi" => Ok(DistanceUnit::Mi),
            _ => Err(Error::InvalidUnit(s.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_zero_distance_for_same_point() {
        assert_eq!(distance(31.8072, -106.3778, 31.8072, -106.3778), 0.0);
        assert_eq!(distance(-90.0, 0.0, -90.0, 0.0), 0.0);
    }

    #[test]
    fn test_known_distance_jfk_lax() {
        // KJFK -> KLAX is about 3974 km on a sphere
        let d = distance(40.6413, -73.7781, 33.9416, -118.4085);
        assert!((d - 3974.0).abs() < 15.0, "got {}", d);
    }

    #[test]
    fn test_el_paso_neighbours() {
        // ELP and CJS (Ciudad Juarez) sit a few kilometres apart
        let d = distance(31.8072, -106.3778, 31.6361, -106.429);
        assert!(d > 15.0 && d < 25.0, "got {}", d);
    }

    #[test]
    fn test_antipodal_points_are_half_circumference() {
        let d = distance(0.0, 0.0, 0.0, 180.0);
        let half = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((d - half).abs() < 1e-6);
    }

    #[test]
    fn test_unit_conversion() {
        assert!((km_to_mi(100.0) - 62.1371).abs() < 1e-9);
        assert!((mi_to_km(62.1371) - 100.0).abs() < 1e-9);
        assert_eq!(DistanceUnit::Km.from_km(10.0), 10.0);
        assert!((DistanceUnit::Mi.from_km(10.0) - 6.21371).abs() < 1e-12);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("km".parse::<DistanceUnit>().unwrap(), DistanceUnit::Km);
        assert_eq!("MI".parse::<DistanceUnit>().unwrap(), DistanceUnit::Mi);
        assert_eq!(" mi ".parse::<DistanceUnit>().unwrap(), DistanceUnit::Mi);
        assert_matches!("ft".parse::<DistanceUnit>(), Err(Error::InvalidUnit(_)));
    }

    #[test]
    fn test_unit_display_and_serde() {
        assert_eq!(DistanceUnit::Mi.to_string(), "mi");
        assert_eq!(serde_json::to_string(&DistanceUnit::Km).unwrap(), "\"km\"");
        let parsed: DistanceUnit = serde_json::from_str("\"mi\"").unwrap();
        assert_eq!(parsed, DistanceUnit::Mi);
    }
}
