//! Computation cache.
//!
//! ```text
//! ┌──────────────┐   key    ┌──────────────┐  bytes  ┌─────────────────┐
//! │   Service    │─────────▶│  CacheLayer  │────────▶│  CacheBackend   │
//! │ (nearest,    │◀─────────│ single-flight│◀────────│ memory | consul │
//! │  distance)   │  value   │  fail-open   │         └─────────────────┘
//! └──────────────┘          └──────┬───────┘
//!                                  │ miss / fault
//!                                  ▼
//!                             compute()
//! ```
//!
//! Keys are built with [`CacheKey::builder`]. The layer never surfaces
//! backend faults; see [`CacheLayer::get_or_compute`].

use std::time::Duration;

mod backend;
mod entry;
mod http;
mod key;
mod layer;
mod memory;
mod metrics;

pub use backend::{BackendStats, CacheBackend};
pub use entry::CacheEntry;
pub use http::{decode_envelope, encode_envelope, HttpKvBackend, HttpKvConfig};
pub use key::{
    namespace_prefix, operation_prefix, round_coordinate, CacheKey, CacheKeyBuilder,
    COORDINATE_DECIMALS,
};
pub use layer::{CacheConfig, CacheLayer};
pub use memory::{InMemoryBackend, InMemoryConfig, DEFAULT_MAX_ENTRIES};
pub use metrics::{CacheMetrics, MetricsSnapshot};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "airports";

/// Default entry lifetime (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default bound on a single backend call
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_millis(250);

/// Default wait for a concurrent computation of the same key
pub const DEFAULT_FLIGHT_WAIT: Duration = Duration::from_secs(5);
