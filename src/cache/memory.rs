//! In-process cache backend.
//!
//! Single-instance deployments keep entries in a `DashMap`. Expired entries
//! are dropped when read and swept by [`InMemoryBackend::purge_expired`]; when
//! the entry budget is reached the entries closest to expiry are evicted
//! first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::backend::{BackendStats, CacheBackend};
use super::entry::CacheEntry;
use crate::error::Result;

/// Default entry budget for the in-memory backend
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// In-memory backend configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of entries held at once
    pub max_entries: usize,
    /// Fraction of `max_entries` to free when the budget is hit
    pub eviction_fraction: f64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            eviction_fraction: 0.10,
        }
    }
}

/// DashMap-backed cache backend
pub struct InMemoryBackend {
    storage: DashMap<String, CacheEntry>,
    config: InMemoryConfig,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expirations: AtomicU64,
    evictions: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::with_config(InMemoryConfig::default())
    }
}

impl InMemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            storage: DashMap::new(),
            config,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop all expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.storage.len();
        self.storage.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.storage.len());
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Make room for one more entry
    fn evict_if_full(&self) {
        if self.storage.len() < self.config.max_entries {
            return;
        }

        if self.purge_expired() > 0 && self.storage.len() < self.config.max_entries {
            return;
        }

        let target = ((self.config.max_entries as f64 * self.config.eviction_fraction).ceil() as usize).max(1);

        let mut candidates: Vec<(String, tokio::time::Instant)> = self
            .storage
            .iter()
            .map(|e| (e.key().clone(), e.value().expires_at()))
            .collect();
        candidates.sort_by_key(|(_, expires_at)| *expires_at);

        for (key, _) in candidates.into_iter().take(target) {
            if self.storage.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let expired = match self.storage.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.record_access();
                return Ok(Some(entry.data().clone()));
            }
            Some(_) => true,
            None => false,
        };

        // The read guard is released above; removal re-checks expiry in case
        // a fresh value was written in between
        if expired
            && self
                .storage
                .remove_if(key, |_, entry| entry.is_expired())
                .is_some()
        {
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if !self.storage.contains_key(key) {
            self.evict_if_full();
        }
        self.storage.insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(self.storage.remove(key).is_some())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let before = self.storage.len();
        self.storage.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.storage.len()) as u64;
        self.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.storage.clear();
        Ok(())
    }

    fn supports_prefix_delete(&self) -> bool {
        true
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            entries: Some(self.storage.len() as u64),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("entries", &self.storage.len())
            .field("max_entries", &self.config.max_entries)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryBackend::new();
        backend.set("k", Bytes::from_static(b"v"), TTL).await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_miss() {
        let backend = InMemoryBackend::new();
        backend
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
        assert_eq!(backend.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = InMemoryBackend::new();
        backend.set("short", Bytes::new(), Duration::from_secs(1)).await.unwrap();
        backend.set("long", Bytes::new(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_prefix() {
        let backend = InMemoryBackend::new();
        backend.set("airports:nearest:1", Bytes::new(), TTL).await.unwrap();
        backend.set("airports:nearest:2", Bytes::new(), TTL).await.unwrap();
        backend.set("airports:distance:1", Bytes::new(), TTL).await.unwrap();
        backend.set("other:nearest:1", Bytes::new(), TTL).await.unwrap();

        assert!(backend.supports_prefix_delete());
        assert_eq!(backend.clear_prefix("airports:nearest:").await.unwrap(), 2);
        assert_eq!(backend.len(), 2);

        assert_eq!(backend.clear_prefix("airports:").await.unwrap(), 1);
        assert!(backend.get("other:nearest:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let backend = InMemoryBackend::new();
        for i in 0..10 {
            backend.set(&format!("k{}", i), Bytes::new(), TTL).await.unwrap();
        }
        backend.clear().await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_prefers_soonest_expiry() {
        let backend = InMemoryBackend::with_config(InMemoryConfig {
            max_entries: 4,
            eviction_fraction: 0.25,
        });

        for i in 0..4u64 {
            backend
                .set(&format!("k{}", i), Bytes::new(), Duration::from_secs(10 + i))
                .await
                .unwrap();
        }
        backend.set("k4", Bytes::new(), Duration::from_secs(100)).await.unwrap();

        assert_eq!(backend.len(), 4);
        assert!(backend.get("k0").await.unwrap().is_none());
        assert!(backend.get("k4").await.unwrap().is_some());
        assert_eq!(backend.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let backend = InMemoryBackend::with_config(InMemoryConfig {
            max_entries: 2,
            eviction_fraction: 0.5,
        });
        backend.set("a", Bytes::from_static(b"1"), TTL).await.unwrap();
        backend.set("b", Bytes::from_static(b"1"), TTL).await.unwrap();
        backend.set("a", Bytes::from_static(b"2"), TTL).await.unwrap();

        assert_eq!(backend.len(), 2);
        assert_eq!(backend.get("a").await.unwrap(), Some(Bytes::from_static(b"2")));
        assert_eq!(backend.stats().evictions, 0);
    }
}
