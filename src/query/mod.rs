//! Nearest-Neighbor Query
//!
//! Orchestrates the lookup pipeline:
//!
//! ```text
//! BoundingBox::around → snapshot.active_in_range → country filter
//!        → haversine per candidate → stable sort → truncate(limit)
//! ```
//!
//! The engine holds no mutable state. Each call works on one immutable
//! snapshot and may run concurrently with any number of other calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::geo::{self, BoundingBox, DistanceUnit};
use crate::store::{filter_by_country, LocationRecord, LocationStore};

/// Default number of results
pub const DEFAULT_LIMIT: usize = 3;

/// Default search radius in kilometres
pub const DEFAULT_RADIUS_KM: f64 = 2000.0;

// =============================================================================
// Query Parameters
// =============================================================================

/// Parameters of a nearest-location lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub limit: usize,
    /// Prefilter radius; results beyond it can still appear when the box
    /// corners admit them
    pub radius_km: f64,
    /// Optional ISO 3166-1 alpha-2 filter
    pub country: Option<String>,
    pub unit: DistanceUnit,
}

impl NearestQuery {
    /// Query with default limit, radius and unit
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            limit: DEFAULT_LIMIT,
            radius_km: DEFAULT_RADIUS_KM,
            country: None,
            unit: DistanceUnit::Km,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = radius_km;
        self
    }

    /// Blank codes are treated as no filter
    pub fn country(mut self, country: impl Into<String>) -> Self {
        let country = country.into();
        let trimmed = country.trim();
        self.country = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_uppercase())
        };
        self
    }

    /// Effective country filter; a blank code set directly on the field means none
    pub fn country_filter(&self) -> Option<&str> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }

    pub fn unit(mut self, unit: DistanceUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Range checks on every parameter
    pub fn validate(&self) -> Result<()> {
        if !geo::is_valid_coordinate(self.latitude, self.longitude) {
            return Err(Error::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        if self.limit < 1 {
            return Err(Error::InvalidLimit(self.limit));
        }
        if !(self.radius_km > 0.0 && self.radius_km.is_finite()) {
            return Err(Error::InvalidRadius(self.radius_km));
        }
        Ok(())
    }
}

// =============================================================================
// Query Result
// =============================================================================

/// A record paired with its distance from one query point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCandidate {
    #[serde(flatten)]
    pub record: LocationRecord,
    pub distance_km: f64,
    /// Present when the query asked for miles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_mi: Option<f64>,
}

impl QueryCandidate {
    /// Distance expressed in the given unit
    pub fn distance_in(&self, unit: DistanceUnit) -> f64 {
        unit.from_km(self.distance_km)
    }
}

// =============================================================================
// Query Engine
// =============================================================================

/// Nearest-neighbour lookup over a location store.
#[derive(Debug)]
pub struct NearestNeighborQuery<S> {
    store: Arc<S>,
}

impl<S> Clone for NearestNeighborQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LocationStore> NearestNeighborQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Up to `limit` records ordered by non-decreasing distance.
    ///
    /// Exact distance ties keep the store's iteration order. An empty result
    /// is a normal outcome, not an error.
    pub fn nearest(&self, query: &NearestQuery) -> Result<Vec<QueryCandidate>> {
        query.validate()?;

        let snapshot = self.store.snapshot()?;
        let bbox = BoundingBox::around(query.latitude, query.longitude, query.radius_km);

        let in_range = snapshot.active_in_range(&bbox);
        let candidates: Box<dyn Iterator<Item = &LocationRecord> + '_> = match query.country_filter() {
            Some(code) => Box::new(filter_by_country(in_range, code)),
            None => Box::new(in_range),
        };

        let mut scored: Vec<(f64, &LocationRecord)> = candidates
            .map(|r| {
                let d = geo::distance(query.latitude, query.longitude, r.latitude, r.longitude);
                (d, r)
            })
            .collect();

        trace!(
            candidates = scored.len(),
            lat_min = bbox.lat_min,
            lat_max = bbox.lat_max,
            lon_min = bbox.lon_min,
            lon_max = bbox.lon_max,
            "Scored bounding-box candidates"
        );

        // sort_by is stable
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(query.limit);

        Ok(scored
            .into_iter()
            .map(|(distance_km, record)| QueryCandidate {
                record: record.clone(),
                distance_km,
                distance_mi: match query.unit {
                    DistanceUnit::Mi => Some(geo::km_to_mi(distance_km)),
                    DistanceUnit::Km => None,
                },
            })
            .collect())
    }
}

// =============================================================================
// Tests
// =============================================================================
