//! Dataset import from JSON.
//!
//! The dataset is a JSON array of [`LocationRecord`] objects:
//!
//! ```json
//! [
//!   {"id": "KELP", "display_code": "ELP", "name": "El Paso Intl",
//!    "latitude": 31.8072, "longitude": -106.3778, "country_code": "US"}
//! ]
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use super::record::LocationRecord;
use crate::error::Result;

/// Parse records from any reader.
///
/// Only the JSON shape is checked here; coordinate and id validation happens
/// when the records are published to a store.
pub fn parse_records<R: Read>(reader: R) -> Result<Vec<LocationRecord>> {
    let records: Vec<LocationRecord> = serde_json::from_reader(reader)?;
    Ok(records)
}

/// Load records from a JSON file.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<LocationRecord>> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading location dataset");

    let file = File::open(path)?;
    let records = parse_records(BufReader::new(file))?;

    debug!(path = %path.display(), count = records.len(), "Parsed location dataset");
    Ok(records)
}
