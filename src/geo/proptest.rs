//! Property-Based Tests for Geographic Math
//!
//! # Test Properties
//!
//! 1. **Symmetry**: distance(A, B) == distance(B, A)
//! 2. **Identity**: distance(A, A) == 0
//! 3. **Round Trip**: km_to_mi(mi_to_km(x)) ≈ x
//! 4. **Superset**: every point within the radius lies inside the bounding box
//!    (checked for |lat| <= 45 and radius <= 300 km, where the flat
//!    approximation holds, and for circles that reach a pole)

#![cfg(test)]

use proptest::prelude::*;

use super::bounds::BoundingBox;
use super::distance::{distance, km_to_mi, mi_to_km, EARTH_RADIUS_KM};

// =============================================================================
// Property Strategies
// =============================================================================

fn latitude_strategy() -> impl Strategy<Value = f64> {
    -90.0f64..=90.0
}

fn longitude_strategy() -> impl Strategy<Value = f64> {
    -180.0f64..=180.0
}

fn coordinate_strategy() -> impl Strategy<Value = (f64, f64)> {
    (latitude_strategy(), longitude_strategy())
}

/// The 111 km/degree box stays a strict superset only at moderate latitudes and radii
fn mid_latitude_coordinate_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-45.0f64..=45.0, longitude_strategy())
}

/// Centres within 2° of a pole; paired with radii of 230 km or more the circle reaches it
fn polar_coordinate_strategy() -> impl Strategy<Value = (f64, f64)> {
    (prop_oneof![88.0f64..=90.0, -90.0f64..=-88.0], longitude_strategy())
}

// =============================================================================
// Distance Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_distance_is_symmetric(a in coordinate_strategy(), b in coordinate_strategy()) {
        let ab = distance(a.0, a.1, b.0, b.1);
        let ba = distance(b.0, b.1, a.0, a.1);
        prop_assert!((ab - ba).abs() < 1e-9, "ab={} ba={}", ab, ba);
    }

    #[test]
    fn prop_distance_to_self_is_zero(a in coordinate_strategy()) {
        prop_assert_eq!(distance(a.0, a.1, a.0, a.1), 0.0);
    }

    #[test]
    fn prop_distance_is_bounded(a in coordinate_strategy(), b in coordinate_strategy()) {
        let d = distance(a.0, a.1, b.0, b.1);
        prop_assert!(d >= 0.0);
        prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
    }

    #[test]
    fn prop_unit_round_trip(x in 0.0f64..1.0e6) {
        let back = km_to_mi(mi_to_km(x));
        prop_assert!((back - x).abs() <= 1e-9 * x.max(1.0));
        let back = mi_to_km(km_to_mi(x));
        prop_assert!((back - x).abs() <= 1e-9 * x.max(1.0));
    }
}

// =============================================================================
// Bounding Box Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_box_contains_centre(c in coordinate_strategy(), radius in 0.1f64..5000.0) {
        let bbox = BoundingBox::around(c.0, c.1, radius);
        prop_assert!(bbox.contains(c.0, c.1));
    }

    #[test]
    fn prop_box_is_superset_of_radius(
        c in mid_latitude_coordinate_strategy(),
        p in coordinate_strategy(),
        radius in 1.0f64..300.0,
    ) {
        let bbox = BoundingBox::around(c.0, c.1, radius);
        if distance(c.0, c.1, p.0, p.1) <= radius {
            prop_assert!(bbox.contains(p.0, p.1), "centre={:?} point={:?} r={}", c, p, radius);
        }
    }

    #[test]
    fn prop_box_is_superset_of_pole_touching_radius(
        c in polar_coordinate_strategy(),
        p in coordinate_strategy(),
        radius in 230.0f64..600.0,
    ) {
        let bbox = BoundingBox::around(c.0, c.1, radius);
        prop_assert!(bbox.spans_all_longitudes());
        if distance(c.0, c.1, p.0, p.1) <= radius {
            prop_assert!(bbox.contains(p.0, p.1), "centre={:?} point={:?} r={}", c, p, radius);
        }
    }

    #[test]
    fn prop_longitude_span_is_finite(c in coordinate_strategy(), radius in 0.1f64..20000.0) {
        let bbox = BoundingBox::around(c.0, c.1, radius);
        prop_assert!(bbox.lon_span().is_finite());
        prop_assert!(bbox.lon_span() <= 360.0);
        prop_assert!(bbox.lat_min >= -90.0 && bbox.lat_max <= 90.0);
    }
}
