//! Locator Service
//!
//! Entry point used by request handlers. Combines the nearest-neighbour
//! engine with the computation cache and owns the reload lifecycle:
//!
//! ```text
//! nearest(query) ──validate──▶ round coords ──▶ CacheKey
//!                                                  │
//!                         CacheLayer::get_or_compute(key, nearest_ttl)
//!                                                  │ miss
//!                                                  ▼
//!                                   NearestNeighborQuery::nearest
//!
//! reload(records) ──▶ store.publish ──▶ cache.clear_namespace
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::cache::{round_coordinate, CacheBackend, CacheConfig, CacheLayer};
use crate::error::{Error, Result};
use crate::geo::{self, DistanceUnit};
use crate::query::{NearestNeighborQuery, NearestQuery, QueryCandidate};
use crate::store::{InMemoryLocationStore, LocationRecord, LocationStore};

/// Default lifetime of cached nearest-location answers (5 minutes)
pub const DEFAULT_NEAREST_TTL: Duration = Duration::from_secs(300);

/// Default lifetime of cached point-to-point distances (15 minutes)
pub const DEFAULT_DISTANCE_TTL: Duration = Duration::from_secs(900);

/// Service configuration
#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub nearest_ttl: Duration,
    pub distance_ttl: Duration,
    pub cache: CacheConfig,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            nearest_ttl: DEFAULT_NEAREST_TTL,
            distance_ttl: DEFAULT_DISTANCE_TTL,
            cache: CacheConfig::default(),
        }
    }
}

/// Great-circle distance between two stored locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDistance {
    pub from: String,
    pub to: String,
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_mi: Option<f64>,
}

/// Cached location lookups over a location store
pub struct LocatorService<S> {
    engine: NearestNeighborQuery<S>,
    cache: Arc<CacheLayer>,
    config: LocatorConfig,
}

impl<S: LocationStore> LocatorService<S> {
    /// Build a service whose cache layer sits on `backend`
    pub fn new(store: Arc<S>, backend: Arc<dyn CacheBackend>, config: LocatorConfig) -> Self {
        let cache = Arc::new(CacheLayer::new(backend, config.cache.clone()));
        Self::with_cache(store, cache, config)
    }

    /// Build a service over an existing cache layer
    pub fn with_cache(store: Arc<S>, cache: Arc<CacheLayer>, config: LocatorConfig) -> Self {
        Self {
            engine: NearestNeighborQuery::new(store),
            cache,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    pub fn cache(&self) -> &Arc<CacheLayer> {
        &self.cache
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// True once the store can serve a snapshot
    pub fn is_ready(&self) -> bool {
        self.engine.store().snapshot().is_ok()
    }

    /// Nearest active locations to a point, served from cache when possible.
    ///
    /// Coordinates are rounded to cache-key precision before computing, so
    /// the cached answer is exactly the answer for its key.
    #[instrument(
        skip(self, query),
        fields(lat = query.latitude, lon = query.longitude, limit = query.limit)
    )]
    pub async fn nearest(&self, query: &NearestQuery) -> Result<Vec<QueryCandidate>> {
        query.validate()?;

        let mut rounded = query.clone();
        rounded.latitude = round_coordinate(query.latitude);
        rounded.longitude = round_coordinate(query.longitude);

        let country = rounded.country_filter().map(str::to_uppercase);
        let key = self
            .cache
            .key("nearest")
            .coordinate(rounded.latitude)
            .coordinate(rounded.longitude)
            .integer(i64::try_from(rounded.limit).unwrap_or(i64::MAX))
            .number(rounded.radius_km)
            .optional(country.as_deref())
            .text(rounded.unit.as_str())
            .build();

        let engine = self.engine.clone();
        self.cache
            .get_or_compute(&key, self.config.nearest_ttl, move || async move {
                engine.nearest(&rounded)
            })
            .await
    }

    /// Distance between two stored locations, looked up by id
    #[instrument(skip(self))]
    pub async fn distance_between(
        &self,
        from_id: &str,
        to_id: &str,
        unit: DistanceUnit,
    ) -> Result<RouteDistance> {
        let from_id = from_id.trim().to_uppercase();
        let to_id = to_id.trim().to_uppercase();

        let key = self
            .cache
            .key("distance")
            .text(&from_id)
            .text(&to_id)
            .text(unit.as_str())
            .build();

        let store = self.engine.store().clone();
        self.cache
            .get_or_compute(&key, self.config.distance_ttl, move || async move {
                let snapshot = store.snapshot()?;
                let from = snapshot
                    .get(&from_id)
                    .ok_or_else(|| Error::LocationNotFound(from_id.clone()))?;
                let to = snapshot
                    .get(&to_id)
                    .ok_or_else(|| Error::LocationNotFound(to_id.clone()))?;

                let distance_km = geo::distance(from.latitude, from.longitude, to.latitude, to.longitude);
                Ok(RouteDistance {
                    from: from.id.clone(),
                    to: to.id.clone(),
                    distance_km,
                    distance_mi: match unit {
                        DistanceUnit::Mi => Some(geo::km_to_mi(distance_km)),
                        DistanceUnit::Km => None,
                    },
                })
            })
            .await
    }

    /// Drop every cached answer in this service's namespace
    pub async fn invalidate_all(&self) -> bool {
        self.cache.clear_namespace().await
    }
}

impl LocatorService<InMemoryLocationStore> {
    /// Publish a new snapshot and invalidate cached answers.
    ///
    /// Returns the number of records published. A rejected batch leaves both
    /// the snapshot and the cache untouched.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn reload(&self, records: Vec<LocationRecord>) -> Result<usize> {
        let snapshot = self.engine.store().publish(records)?;

        if !self.invalidate_all().await {
            warn!(
                namespace = %self.config.cache.namespace,
                "Cache invalidation failed after reload; stale answers expire with their TTL"
            );
        }

        info!(records = snapshot.len(), "Reloaded locations");
        Ok(snapshot.len())
    }
}

impl<S> std::fmt::Debug for LocatorService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocatorService")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryBackend;
    use assert_matches::assert_matches;

    fn airports() -> Vec<LocationRecord> {
        vec![
            LocationRecord::new("KELP", "El Paso International", 31.8072, -106.3776)
                .with_display_code("ELP")
                .with_country("US"),
            LocationRecord::new("MMCS", "Abraham Gonzalez International", 31.6361, -106.4289)
                .with_display_code("CJS")
                .with_country("MX"),
            LocationRecord::new("KLRU", "Las Cruces International", 32.2894, -106.9220)
                .with_display_code("LRU")
                .with_country("US"),
        ]
    }

    fn service() -> LocatorService<InMemoryLocationStore> {
        let store = Arc::new(InMemoryLocationStore::with_records(airports()).unwrap());
        LocatorService::new(store, Arc::new(InMemoryBackend::new()), LocatorConfig::default())
    }

    #[tokio::test]
    async fn test_nearest_is_cached() {
        let svc = service();
        let query = NearestQuery::new(31.76, -106.49).limit(2);

        let first = svc.nearest(&query).await.unwrap();
        let second = svc.nearest(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].record.display_code, "ELP");
        assert_eq!(first[1].record.display_code, "CJS");
        assert_eq!(svc.cache().metrics().computes(), 1);
        assert_eq!(svc.cache().metrics().hits(), 1);
    }

    #[tokio::test]
    async fn test_jittered_points_share_entry() {
        let svc = service();
        svc.nearest(&NearestQuery::new(31.760_01, -106.490_02)).await.unwrap();
        svc.nearest(&NearestQuery::new(31.759_99, -106.489_98)).await.unwrap();

        assert_eq!(svc.cache().metrics().computes(), 1);
    }

    #[tokio::test]
    async fn test_unit_is_part_of_key() {
        let svc = service();
        let km = svc.nearest(&NearestQuery::new(31.76, -106.49)).await.unwrap();
        let mi = svc
            .nearest(&NearestQuery::new(31.76, -106.49).unit(DistanceUnit::Mi))
            .await
            .unwrap();

        assert!(km[0].distance_mi.is_none());
        assert!(mi[0].distance_mi.is_some());
        assert_eq!(svc.cache().metrics().computes(), 2);
    }

    #[tokio::test]
    async fn test_blank_country_field_shares_unfiltered_entry() {
        let svc = service();
        let plain = NearestQuery::new(31.76, -106.49);
        let mut blank = plain.clone();
        blank.country = Some(String::new());

        let a = svc.nearest(&plain).await.unwrap();
        let b = svc.nearest(&blank).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(svc.cache().metrics().computes(), 1);
    }

    #[tokio::test]
    async fn test_invalid_query_is_not_computed() {
        let svc = service();
        let result = svc.nearest(&NearestQuery::new(95.0, 0.0)).await;

        assert_matches!(result, Err(Error::InvalidCoordinate { .. }));
        assert_eq!(svc.cache().metrics().computes(), 0);
    }

    #[tokio::test]
    async fn test_unloaded_store_is_unavailable() {
        let store = Arc::new(InMemoryLocationStore::new());
        let svc = LocatorService::new(store, Arc::new(InMemoryBackend::new()), LocatorConfig::default());

        assert!(!svc.is_ready());
        let result = svc.nearest(&NearestQuery::new(0.0, 0.0)).await;
        assert_matches!(result, Err(Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_distance_between() {
        let svc = service();
        let route = svc.distance_between("kelp", " MMCS ", DistanceUnit::Mi).await.unwrap();

        assert_eq!(route.from, "KELP");
        assert_eq!(route.to, "MMCS");
        assert!((route.distance_km - 19.63).abs() < 0.1);
        let mi = route.distance_mi.unwrap();
        assert!((mi - geo::km_to_mi(route.distance_km)).abs() < 1e-9);

        svc.distance_between("KELP", "MMCS", DistanceUnit::Mi).await.unwrap();
        assert_eq!(svc.cache().metrics().computes(), 1);
    }

    #[tokio::test]
    async fn test_distance_unknown_id() {
        let svc = service();
        let result = svc.distance_between("KELP", "ZZZZ", DistanceUnit::Km).await;
        assert_matches!(result, Err(Error::LocationNotFound(id)) if id == "ZZZZ");
    }

    #[tokio::test]
    async fn test_reload_invalidates_cached_answers() {
        let svc = service();
        let query = NearestQuery::new(31.76, -106.49).limit(1);
        assert_eq!(svc.nearest(&query).await.unwrap()[0].record.id, "KELP");

        let closed: Vec<_> = airports()
            .into_iter()
            .map(|r| {
                let active = r.id != "KELP";
                r.with_active(active)
            })
            .collect();
        assert_eq!(svc.reload(closed).await.unwrap(), 3);

        assert_eq!(svc.nearest(&query).await.unwrap()[0].record.id, "MMCS");
        assert_eq!(svc.cache().metrics().computes(), 2);
    }

    #[tokio::test]
    async fn test_rejected_reload_keeps_cache() {
        let svc = service();
        let query = NearestQuery::new(31.76, -106.49);
        svc.nearest(&query).await.unwrap();

        let bad = vec![LocationRecord::new("BAD", "Nowhere", 123.0, 0.0)];
        assert_matches!(svc.reload(bad).await, Err(Error::InvalidRecord { .. }));

        svc.nearest(&query).await.unwrap();
        assert_eq!(svc.cache().metrics().computes(), 1);
    }
}
