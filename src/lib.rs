//! Airport Locator - Nearest-Airport Lookup with a Computation Cache
//!
//! Answers "which airports are closest to this point?" over a snapshot of
//! airport records, and caches the answers so repeated lookups for the same
//! spot skip the distance scan.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │   Service    │───▶│    Query     │───▶│    Store     │
//! │ (cached API) │    │  (bbox scan, │    │ (immutable   │
//! │              │    │  haversine)  │    │  snapshots)  │
//! └──────┬───────┘    └──────────────┘    └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐
//! │    Cache     │──▶ memory | Consul KV
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`geo`] - Great-circle distance, units and bounding boxes
//! - [`store`] - Location records, snapshots and import
//! - [`query`] - Nearest-neighbour engine
//! - [`cache`] - TTL computation cache and its backends
//! - [`service`] - Cached lookups and the reload lifecycle
//! - [`error`] - Error types

pub mod cache;
pub mod error;
pub mod geo;
pub mod query;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use cache::{CacheBackend, CacheConfig, CacheKey, CacheLayer, HttpKvBackend, InMemoryBackend};
pub use error::{Error, Result};
pub use geo::DistanceUnit;
pub use query::{NearestNeighborQuery, NearestQuery, QueryCandidate};
pub use service::{LocatorConfig, LocatorService, RouteDistance};
pub use store::{InMemoryLocationStore, LocationRecord, LocationSnapshot, LocationStore};
