//! Error types for the airport locator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while answering location queries
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Latitude or longitude outside the valid degree range
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Result limit below one
    #[error("Invalid limit: {0} (must be at least 1)")]
    InvalidLimit(usize),

    /// Search radius not strictly positive
    #[error("Invalid search radius: {0} km (must be positive)")]
    InvalidRadius(f64),

    /// Unknown distance unit
    #[error("Invalid distance unit: {0} (expected 'km' or 'mi')")]
    InvalidUnit(String),

    /// Import data contained a record that cannot be stored
    #[error("Invalid location record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    /// Location id not present in the current snapshot
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Location store has no readable snapshot
    #[error("Location store unavailable: {0}")]
    StoreUnavailable(String),

    /// Cache backend I/O failure (recovered inside the cache layer)
    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    /// Cache backend HTTP transport error
    #[error("Cache backend connection error: {0}")]
    CacheConnection(#[source] reqwest::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by caller input rather than system state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidCoordinate { .. }
                | Error::InvalidLimit(_)
                | Error::InvalidRadius(_)
                | Error::InvalidUnit(_)
        )
    }

    /// True for transient failures where retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_) | Error::CacheBackend(_) | Error::CacheConnection(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(Error::InvalidLimit(0).is_validation());
        assert!(Error::InvalidRadius(-1.0).is_validation());
        assert!(Error::InvalidUnit("ft".into()).is_validation());
        assert!(Error::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0
        }
        .is_validation());
        assert!(!Error::StoreUnavailable("empty".into()).is_validation());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::StoreUnavailable("not loaded".into()).is_retryable());
        assert!(Error::CacheBackend("timeout".into()).is_retryable());
        assert!(!Error::InvalidLimit(0).is_retryable());
        assert!(!Error::LocationNotFound("KXXX".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidCoordinate {
            latitude: 95.5,
            longitude: 10.0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid coordinate: latitude 95.5, longitude 10"
        );
        assert_eq!(
            Error::LocationNotFound("KELP".into()).to_string(),
            "Location not found: KELP"
        );
    }
}
