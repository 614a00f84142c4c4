//! Cache Entry Types

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

/// A stored value with its creation time and time-to-live.
///
/// Timestamps come from `tokio::time`, so a paused test clock controls expiry.
#[derive(Debug)]
pub struct CacheEntry {
    data: Bytes,
    created_at: Instant,
    ttl: Duration,
    access_count: AtomicU32,
}

impl CacheEntry {
    /// Create an entry that expires `ttl` from now
    pub fn new(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
            access_count: AtomicU32::new(0),
        }
    }

    /// Get data (zero-copy)
    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[inline]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[inline]
    pub fn expires_at(&self) -> Instant {
        self.created_at + self.ttl
    }

    /// An entry is expired once its full TTL has elapsed
    #[inline]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }

    /// Remaining lifetime, zero when expired
    pub fn remaining(&self) -> Duration {
        self.expires_at().saturating_duration_since(Instant::now())
    }

    /// Record a read and return the new count
    #[inline]
    pub fn record_access(&self) -> u32 {
        self.access_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn access_count(&self) -> u32 {
        self.access_count.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let entry = CacheEntry::new(Bytes::from_static(b"[]"), Duration::from_secs(60));
        assert!(!entry.is_expired());
        assert_eq!(entry.remaining(), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_entry_access_tracking() {
        let entry = CacheEntry::new(Bytes::from_static(b"data"), Duration::from_secs(1));
        assert_eq!(entry.size(), 4);
        assert_eq!(entry.access_count(), 0);
        assert_eq!(entry.record_access(), 1);
        assert_eq!(entry.record_access(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_immediately_expired() {
        let entry = CacheEntry::new(Bytes::new(), Duration::ZERO);
        assert!(entry.is_expired());
    }
}
