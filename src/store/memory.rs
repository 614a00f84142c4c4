//! In-process location store with atomic snapshot replacement.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::record::LocationRecord;
use super::snapshot::LocationSnapshot;
use super::LocationStore;
use crate::error::{Error, Result};

/// Location store holding the current snapshot in memory.
///
/// Readers clone the `Arc` under a short read lock; `publish` builds the new
/// snapshot outside the lock and swaps it in one write.
#[derive(Debug, Default)]
pub struct InMemoryLocationStore {
    current: RwLock<Option<Arc<LocationSnapshot>>>,
}

impl InMemoryLocationStore {
    /// Store with nothing loaded yet; reads fail until the first publish.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with records.
    pub fn with_records(records: Vec<LocationRecord>) -> Result<Self> {
        let store = Self::new();
        store.publish(records)?;
        Ok(store)
    }

    /// Validate records and replace the current snapshot.
    ///
    /// On a validation error the previous snapshot stays in place.
    pub fn publish(&self, records: Vec<LocationRecord>) -> Result<Arc<LocationSnapshot>> {
        let snapshot = Arc::new(LocationSnapshot::new(records)?);
        *self.current.write() = Some(snapshot.clone());

        info!(
            records = snapshot.len(),
            active = snapshot.active_count(),
            "Published location snapshot"
        );

        Ok(snapshot)
    }

    /// True once a snapshot has been published
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Drop the current snapshot; subsequent reads report the store unavailable.
    pub fn unload(&self) {
        *self.current.write() = None;
    }
}

impl LocationStore for InMemoryLocationStore {
    fn snapshot(&self) -> Result<Arc<LocationSnapshot>> {
        self.current
            .read()
            .clone()
            .ok_or_else(|| Error::StoreUnavailable("no location snapshot loaded".to_string()))
    }
}
