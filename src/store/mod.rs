//! Location Store
//!
//! Read-oriented collection of airport records, published as immutable
//! snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  publish(records)  ┌───────────────────────┐
//! │ Import collaborator  │──────────────────▶│ InMemoryLocationStore │
//! └──────────────────────┘                    │  RwLock<Arc<Snapshot>> │
//!                                             └───────────┬───────────┘
//!                                                         │ snapshot()
//!                                                         ▼
//!                                             ┌───────────────────────┐
//!                                             │   LocationSnapshot    │
//!                                             │ (sorted by latitude)  │
//!                                             └───────────────────────┘
//! ```
//!
//! A query grabs one `Arc<LocationSnapshot>` and works against it for its
//! whole lifetime, so a concurrent reload never changes the data underneath
//! a running query.

pub mod import;
mod memory;
mod record;
mod snapshot;

pub use memory::InMemoryLocationStore;
pub use record::LocationRecord;
pub use snapshot::{filter_by_country, LocationSnapshot};

use std::sync::Arc;

use crate::error::Result;

/// Source of location snapshots for the query engine.
pub trait LocationStore: Send + Sync {
    /// Current snapshot.
    ///
    /// Fails with `StoreUnavailable` when no data can be read; an empty
    /// snapshot is a valid, readable state.
    fn snapshot(&self) -> Result<Arc<LocationSnapshot>>;
}

impl<S: LocationStore + ?Sized> LocationStore for Arc<S> {
    fn snapshot(&self) -> Result<Arc<LocationSnapshot>> {
        (**self).snapshot()
    }
}
