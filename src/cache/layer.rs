//! Computation cache with single-flight and fail-open backend access.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::key::{namespace_prefix, CacheKey, CacheKeyBuilder};
use super::memory::InMemoryBackend;
use super::metrics::CacheMetrics;
use super::{DEFAULT_BACKEND_TIMEOUT, DEFAULT_FLIGHT_WAIT, DEFAULT_NAMESPACE, DEFAULT_TTL};
use crate::error::Result;

/// Entry in the flight table, removed on drop so cancelled callers release it
struct FlightSlot<'a> {
    table: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        self.table
            .remove_if(self.key.as_str(), |_, current| Arc::ptr_eq(current, &self.lock));
    }
}

/// Cache layer configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix of every key this layer writes
    pub namespace: String,
    /// TTL used when a caller does not pass one
    pub default_ttl: Duration,
    /// Upper bound on any single backend call
    pub backend_timeout: Duration,
    /// How long a caller waits for another caller computing the same key
    pub flight_wait: Duration,
    /// When false every call computes directly
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            default_ttl: DEFAULT_TTL,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            flight_wait: DEFAULT_FLIGHT_WAIT,
            enabled: true,
        }
    }
}

/// Outcome of a bounded backend call
enum Call<T> {
    Done(T),
    Failed,
}

/// Read-through cache over a pluggable backend.
///
/// Values are JSON-encoded before they reach the backend. Backend failures
/// and timeouts are logged, counted, and then ignored; only errors from the
/// compute function reach the caller.
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
    metrics: CacheMetrics,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            metrics: CacheMetrics::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Layer over a fresh in-process backend with default settings
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Start a key for `operation` in this layer's namespace
    pub fn key(&self, operation: &str) -> CacheKeyBuilder {
        CacheKey::builder(&self.config.namespace, operation)
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Concurrent callers with the same key share one computation: the first
    /// computes while the rest wait up to `flight_wait` and then read the
    /// stored value.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: impl Into<Option<Duration>>,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ttl = ttl.into().unwrap_or(self.config.default_ttl);

        if !self.config.enabled {
            return self.run(compute).await;
        }

        if let Some(value) = self.lookup(key).await {
            self.metrics.record_hit();
            debug!(key = %key, "Cache hit");
            return Ok(value);
        }
        self.metrics.record_miss();
        debug!(key = %key, "Cache miss");

        let flight = FlightSlot {
            table: &self.in_flight,
            key: key.as_str().to_string(),
            lock: self
                .in_flight
                .entry(key.as_str().to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone(),
        };

        let guard = match timeout(self.config.flight_wait, flight.lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!(key = %key, "Gave up waiting for concurrent computation");
                None
            }
        };

        if guard.is_some() {
            if let Some(value) = self.lookup(key).await {
                self.metrics.record_coalesced();
                return Ok(value);
            }
        }

        let result = self.run(compute).await;
        if let Ok(value) = &result {
            self.store(key, value, ttl).await;
        }

        drop(guard);
        drop(flight);

        result
    }

    /// Read a cached value without computing
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        self.lookup(key).await
    }

    /// Store a value; returns false when the backend did not accept it
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: impl Into<Option<Duration>>,
    ) -> bool {
        if !self.config.enabled {
            return false;
        }
        let ttl = ttl.into().unwrap_or(self.config.default_ttl);
        self.store(key, value, ttl).await
    }

    /// Remove one key; returns whether the backend reported it present
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.metrics.record_invalidation();
        match self.bounded("delete", self.backend.delete(key.as_str())).await {
            Call::Done(removed) => removed,
            Call::Failed => false,
        }
    }

    /// Remove every key under `prefix`.
    ///
    /// Backends without prefix deletion are cleared entirely. Returns false
    /// when the backend could not be cleared.
    pub async fn invalidate_namespace(&self, prefix: &str) -> bool {
        self.metrics.record_invalidation();

        if self.backend.supports_prefix_delete() {
            match self
                .bounded("clear_prefix", self.backend.clear_prefix(prefix))
                .await
            {
                Call::Done(removed) => {
                    debug!(prefix, removed, "Invalidated cache prefix");
                    true
                }
                Call::Failed => false,
            }
        } else {
            debug!(
                prefix,
                backend = self.backend.name(),
                "Backend lacks prefix delete, clearing all entries"
            );
            matches!(self.bounded("clear", self.backend.clear()).await, Call::Done(()))
        }
    }

    /// Invalidate this layer's whole namespace
    pub async fn clear_namespace(&self) -> bool {
        let prefix = namespace_prefix(&self.config.namespace);
        self.invalidate_namespace(&prefix).await
    }

    async fn run<T, F, Fut>(&self, compute: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.metrics.record_compute();
        let result = compute().await;
        if result.is_err() {
            self.metrics.record_compute_error();
        }
        result
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.bounded("get", self.backend.get(key.as_str())).await {
            Call::Done(Some(raw)) => raw,
            Call::Done(None) | Call::Failed => return None,
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.metrics.record_corrupt_entry();
                let _ = self.bounded("delete", self.backend.delete(key.as_str())).await;
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> bool {
        let encoded = match serde_json::to_vec(value) {
            Ok(encoded) => Bytes::from(encoded),
            Err(e) => {
                warn!(key = %key, error = %e, "Value not cacheable");
                return false;
            }
        };

        matches!(
            self.bounded("set", self.backend.set(key.as_str(), encoded, ttl))
                .await,
            Call::Done(())
        )
    }

    /// Run a backend call under `backend_timeout`, absorbing failures
    async fn bounded<T, Fut>(&self, operation: &str, call: Fut) -> Call<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match timeout(self.config.backend_timeout, call).await {
            Ok(Ok(value)) => Call::Done(value),
            Ok(Err(e)) => {
                warn!(
                    backend = self.backend.name(),
                    operation,
                    error = %e,
                    "Cache backend error, continuing without cache"
                );
                self.metrics.record_backend_error();
                Call::Failed
            }
            Err(_) => {
                warn!(
                    backend = self.backend.name(),
                    operation,
                    timeout_ms = self.config.backend_timeout.as_millis() as u64,
                    "Cache backend timed out, continuing without cache"
                );
                self.metrics.record_backend_timeout();
                Call::Failed
            }
        }
    }
}

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
