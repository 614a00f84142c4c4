//! Cache backend port.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Storage behind the cache layer.
///
/// Backends store opaque bytes and enforce TTL on read. Errors returned here
/// never reach callers of the cache layer; the layer logs them and computes
/// the value directly.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Get a live value; expired values read as `None`
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value for `ttl`, replacing any previous value
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Remove one key, returning whether it was present (when known)
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove every key starting with `prefix`, returning the count removed
    /// when the backend can tell
    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        Err(Error::CacheBackend(format!(
            "{} does not support prefix deletion (prefix {})",
            self.name(),
            prefix
        )))
    }

    /// Remove everything this backend holds
    async fn clear(&self) -> Result<()>;

    /// Whether `clear_prefix` is implemented
    fn supports_prefix_delete(&self) -> bool {
        false
    }

    /// Operation counters
    fn stats(&self) -> BackendStats;
}

/// Backend statistics
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct BackendStats {
    /// Live entries, when the backend can count them cheaply
    pub entries: Option<u64>,
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub expirations: u64,
    pub evictions: u64,
}
