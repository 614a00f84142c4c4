//! Immutable record snapshot with a latitude-ordered range scan.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::record::LocationRecord;
use crate::error::{Error, Result};
use crate::geo::BoundingBox;

/// Immutable set of records.
///
/// Records are kept sorted by latitude so a range query can binary-search the
/// latitude band and only test longitude on that slice. The sort is stable,
/// so records with equal latitude keep their import order.
#[derive(Debug)]
pub struct LocationSnapshot {
    records: Vec<LocationRecord>,
    by_id: HashMap<String, usize>,
    loaded_at: DateTime<Utc>,
}

impl LocationSnapshot {
    /// Build a snapshot, validating every record and rejecting duplicate ids.
    pub fn new(mut records: Vec<LocationRecord>) -> Result<Self> {
        for record in &records {
            record.validate()?;
        }

        records.sort_by(|a, b| a.latitude.total_cmp(&b.latitude));

        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if by_id.insert(record.id.to_uppercase(), idx).is_some() {
                return Err(Error::InvalidRecord {
                    id: record.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }

        Ok(Self {
            records,
            by_id,
            loaded_at: Utc::now(),
        })
    }

    /// Snapshot with no records
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            by_id: HashMap::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Active records inside the box, in snapshot order.
    pub fn active_in_range<'a>(
        &'a self,
        bbox: &'a BoundingBox,
    ) -> impl Iterator<Item = &'a LocationRecord> + 'a {
        let start = self.records.partition_point(|r| r.latitude < bbox.lat_min);
        let end = self.records.partition_point(|r| r.latitude <= bbox.lat_max);
        let band = if start < end { &self.records[start..end] } else { &[][..] };

        band.iter()
            .filter(move |r| r.active && bbox.contains_longitude(r.longitude))
    }

    /// Look up a record by id, ignoring case
    pub fn get(&self, id: &str) -> Option<&LocationRecord> {
        self.by_id
            .get(&id.to_uppercase())
            .map(|&idx| &self.records[idx])
    }

    /// All records in snapshot order
    pub fn iter(&self) -> impl Iterator<Item = &LocationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of active records
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.active).count()
    }

    /// When this snapshot was built
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

/// Narrow an iterator of records to one country (case-insensitive ISO code).
pub fn filter_by_country<'a, I>(records: I, code: &'a str) -> impl Iterator<Item = &'a LocationRecord>
where
    I: Iterator<Item = &'a LocationRecord> + 'a,
{
    records.filter(move |r| r.in_country(code))
}

// =============================================================================
// Tests
// =============================================================================
