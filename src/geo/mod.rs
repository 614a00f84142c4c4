//! Geographic Math
//!
//! Great-circle distances and the bounding-box prefilter used to narrow a
//! location scan before any trigonometry runs.
//!
//! # Accuracy
//!
//! Distances use a spherical Earth (mean radius 6371 km). Expect roughly 0.5%
//! deviation from ellipsoidal distances under a few thousand kilometres, which
//! is fine for "closest airport" answers and not fine for surveying.

mod bounds;
mod distance;
mod proptest;

pub use bounds::{bounds, BoundingBox, KM_PER_DEGREE_LAT, MIN_LONGITUDE_SCALE};
pub use distance::{distance, km_to_mi, mi_to_km, DistanceUnit, EARTH_RADIUS_KM, KM_TO_MI};

/// Check a coordinate pair against the valid degree ranges.
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_coordinate_bounds() {
        assert!(is_valid_coordinate(0.0, 0.0));
        assert!(is_valid_coordinate(90.0, 180.0));
        assert!(is_valid_coordinate(-90.0, -180.0));
        assert!(!is_valid_coordinate(90.0001, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
