//! Bounding-box prefilter.
//!
//! Converts a centre and radius into a latitude/longitude rectangle around
//! the circular search area. At moderate latitudes and radii the rectangle
//! overestimates. A circle that reaches a pole gets the full longitude range.
//! Close to a pole without reaching it, the floored longitude scale can clip
//! the circle's edges. Exact distances are computed afterwards for whatever
//! survives.

use serde::{Deserialize, Serialize};

/// Approximate kilometres per degree of latitude
pub const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Floor applied to cos(latitude) so the longitude span stays bounded near the poles
pub const MIN_LONGITUDE_SCALE: f64 = 0.1;

/// Rectangular coordinate range in degrees.
///
/// `lon_min`/`lon_max` may extend past ±180 when the search area crosses the
/// antimeridian; [`BoundingBox::contains`] wraps those ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Box around a centre point with the given radius.
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let delta_lat = radius_km / KM_PER_DEGREE_LAT;
        let scale = latitude.to_radians().cos().max(MIN_LONGITUDE_SCALE);
        let delta_lon = delta_lat / scale;

        // A circle reaching a pole covers every longitude
        let touches_pole = latitude + delta_lat >= 90.0 || latitude - delta_lat <= -90.0;

        let (lon_min, lon_max) = if delta_lon >= 180.0 || touches_pole {
            (-180.0, 180.0)
        } else {
            (longitude - delta_lon, longitude + delta_lon)
        };

        Self {
            lat_min: (latitude - delta_lat).max(-90.0),
            lat_max: (latitude + delta_lat).min(90.0),
            lon_min,
            lon_max,
        }
    }

    /// True when the longitude range covers the whole globe
    pub fn spans_all_longitudes(&self) -> bool {
        self.lon_max - self.lon_min >= 360.0
    }

    /// Width of the longitude range in degrees
    pub fn lon_span(&self) -> f64 {
        self.lon_max - self.lon_min
    }

    /// Latitude-only test, used once the latitude band has been located
    #[inline]
    pub fn contains_latitude(&self, latitude: f64) -> bool {
        latitude >= self.lat_min && latitude <= self.lat_max
    }

    /// Longitude test with antimeridian wrapping
    #[inline]
    pub fn contains_longitude(&self, longitude: f64) -> bool {
        if self.spans_all_longitudes() {
            return true;
        }
        let within = |lon: f64| lon >= self.lon_min && lon <= self.lon_max;
        within(longitude) || within(longitude - 360.0) || within(longitude + 360.0)
    }

    /// Full point-in-box test
    #[inline]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.contains_latitude(latitude) && self.contains_longitude(longitude)
    }
}

/// Bounding box as a `(lat_min, lat_max, lon_min, lon_max)` tuple.
pub fn bounds(latitude: f64, longitude: f64, radius_km: f64) -> (f64, f64, f64, f64) {
    let bbox = BoundingBox::around(latitude, longitude, radius_km);
    (bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max)
}

// =============================================================================
// Tests
// =============================================================================
