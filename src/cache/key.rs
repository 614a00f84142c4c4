//! Deterministic cache keys.
//!
//! Keys read `namespace:operation:param:param:...`. Coordinates are rounded
//! to [`COORDINATE_DECIMALS`] places (about 11 m) so jittered GPS fixes of
//! the same spot share one entry.

use std::fmt::{self, Write};

/// Decimal places kept for coordinates in keys
pub const COORDINATE_DECIMALS: i32 = 4;

/// Placeholder for an absent optional parameter
const ABSENT: &str = "*";

/// Round a coordinate to key precision.
///
/// Negative zero is normalised so `-0.00001` and `0.00001` produce the same key.
pub fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_DECIMALS);
    (value * factor).round() / factor + 0.0
}

/// Prefix shared by every key in a namespace
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{}:", namespace)
}

/// Prefix shared by every key of one operation in a namespace
pub fn operation_prefix(namespace: &str, operation: &str) -> String {
    format!("{}:{}:", namespace, operation)
}

/// Cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key for an operation within a namespace
    pub fn builder(namespace: &str, operation: &str) -> CacheKeyBuilder {
        CacheKeyBuilder {
            key: format!("{}:{}", namespace, operation),
        }
    }

    /// Wrap an already-formatted key
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Incremental key construction
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    key: String,
}

impl CacheKeyBuilder {
    /// Append a coordinate rounded to key precision
    pub fn coordinate(mut self, value: f64) -> Self {
        let _ = write!(
            self.key,
            ":{:.*}",
            COORDINATE_DECIMALS as usize,
            round_coordinate(value)
        );
        self
    }

    /// Append an integer parameter
    pub fn integer(mut self, value: impl Into<i64>) -> Self {
        let _ = write!(self.key, ":{}", value.into());
        self
    }

    /// Append a float using its shortest round-trip representation
    pub fn number(mut self, value: f64) -> Self {
        let _ = write!(self.key, ":{}", value + 0.0);
        self
    }

    /// Append a text parameter, percent-encoded so it cannot forge separators
    pub fn text(mut self, value: &str) -> Self {
        let _ = write!(self.key, ":{}", urlencoding::encode(value));
        self
    }

    /// Append an optional text parameter; `None` encodes as `*`
    pub fn optional(self, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.text(v),
            None => {
                let mut this = self;
                this.key.push(':');
                this.key.push_str(ABSENT);
                this
            }
        }
    }

    pub fn build(self) -> CacheKey {
        CacheKey(self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_coordinate(31.760_04), 31.76);
        assert_eq!(round_coordinate(31.760_06), 31.7601);
        assert_eq!(round_coordinate(-106.490_01), -106.49);
        assert!(round_coordinate(-0.000_01).is_sign_positive());
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::builder("airports", "nearest")
            .coordinate(31.76)
            .coordinate(-106.49)
            .integer(2i64)
            .number(2000.0)
            .optional(None)
            .text("km")
            .build();
        assert_eq!(key.as_str(), "airports:nearest:31.7600:-106.4900:2:2000:*:km");
        assert!(key.has_prefix(&namespace_prefix("airports")));
        assert!(key.has_prefix(&operation_prefix("airports", "nearest")));
    }

    #[test]
    fn test_jittered_coordinates_share_key() {
        let a = CacheKey::builder("ns", "op").coordinate(48.858_41).coordinate(2.294_48).build();
        let b = CacheKey::builder("ns", "op").coordinate(48.858_44).coordinate(2.294_51).build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negative_zero_normalised() {
        let a = CacheKey::builder("ns", "op").coordinate(-0.000_01).build();
        let b = CacheKey::builder("ns", "op").coordinate(0.000_01).build();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ns:op:0.0000");
    }

    #[test]
    fn test_text_is_escaped() {
        let key = CacheKey::builder("ns", "op").text("a:b").build();
        assert_eq!(key.as_str(), "ns:op:a%3Ab");
    }

    #[test]
    fn test_distinct_parameters_distinct_keys() {
        let base = || CacheKey::builder("ns", "nearest").coordinate(10.0).coordinate(20.0);
        let km = base().text("km").build();
        let mi = base().text("mi").build();
        assert_ne!(km, mi);
    }
}
