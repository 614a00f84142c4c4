//! Networked cache backend over the Consul KV HTTP API.
//!
//! Consul KV has no per-key TTL, so every value is stored in an envelope
//! carrying its expiry:
//!
//! ```text
//! +----------------------+----------------------+
//! | expires_at (8 bytes) | payload              |
//! | i64 BE, unix millis  | opaque cache bytes   |
//! +----------------------+----------------------+
//! ```
//!
//! Expired envelopes read as a miss and are deleted on the way out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, instrument};

use super::backend::{BackendStats, CacheBackend};
use crate::error::{Error, Result};

/// Envelope header length
const HEADER_LEN: usize = 8;

/// HTTP KV backend configuration
#[derive(Debug, Clone)]
pub struct HttpKvConfig {
    /// Agent base URL
    pub base_url: String,
    /// Key folder all cache entries live under
    pub root: String,
    /// ACL token sent as `X-Consul-Token`
    pub token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpKvConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".to_string(),
            root: "airport-locator/cache".to_string(),
            token: None,
            request_timeout: Duration::from_millis(500),
        }
    }
}

/// Wrap a payload with its absolute expiry
pub fn encode_envelope(payload: &[u8], ttl: Duration) -> Bytes {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_i64(expires_at);
    buf.put_slice(payload);
    buf.freeze()
}

/// Unwrap an envelope read at `now_ms`; `None` when expired
pub fn decode_envelope(mut raw: Bytes, now_ms: i64) -> Result<Option<Bytes>> {
    if raw.len() < HEADER_LEN {
        return Err(Error::CacheBackend(format!(
            "truncated cache envelope ({} bytes)",
            raw.len()
        )));
    }
    let expires_at = raw.get_i64();
    if now_ms >= expires_at {
        return Ok(None);
    }
    Ok(Some(raw))
}

/// Cache backend storing entries in a Consul-compatible KV store
pub struct HttpKvBackend {
    config: HttpKvConfig,
    client: Client,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    expirations: AtomicU64,
}

impl HttpKvBackend {
    /// Create a new backend; no request is made until first use
    pub fn new(config: HttpKvConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &HttpKvConfig {
        &self.config
    }

    fn root(&self) -> &str {
        self.config.root.trim_matches('/')
    }

    /// URL of a key (or key prefix) under the configured root
    fn key_url(&self, key: &str) -> String {
        format!(
            "{}/v1/kv/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.root(),
            urlencoding::encode(key)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.header("X-Consul-Token", token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        self.authorize(request)
            .send()
            .await
            .map_err(Error::CacheConnection)
    }

    fn status_error(operation: &str, status: StatusCode) -> Error {
        Error::CacheBackend(format!("KV {} failed: {}", operation, status))
    }
}

#[async_trait]
impl CacheBackend for HttpKvBackend {
    fn name(&self) -> &'static str {
        "consul"
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);

        let url = format!("{}?raw", self.key_url(key));
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let raw = response.bytes().await.map_err(Error::CacheConnection)?;
                match decode_envelope(raw, Utc::now().timestamp_millis())? {
                    Some(payload) => Ok(Some(payload)),
                    None => {
                        debug!("Expired KV entry {}", key);
                        self.expirations.fetch_add(1, Ordering::Relaxed);
                        self.delete(key).await?;
                        Ok(None)
                    }
                }
            }
            status => Err(Self::status_error("get", status)),
        }
    }

    #[instrument(skip(self, value), fields(size = value.len()))]
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);

        let body = encode_envelope(&value, ttl);
        let response = self.send(self.client.put(self.key_url(key)).body(body)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error("put", response.status()))
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let response = self.send(self.client.delete(self.key_url(key))).await?;
        if response.status().is_success() {
            // Consul acknowledges deletes of absent keys too
            Ok(true)
        } else {
            Err(Self::status_error("delete", response.status()))
        }
    }

    #[instrument(skip(self))]
    async fn clear_prefix(&self, prefix: &str) -> Result<u64> {
        let url = format!("{}?recurse", self.key_url(prefix));
        let response = self.send(self.client.delete(&url)).await?;
        if response.status().is_success() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(0)
        } else {
            Err(Self::status_error("prefix delete", response.status()))
        }
    }

    async fn clear(&self) -> Result<()> {
        let url = format!(
            "{}/v1/kv/{}/?recurse",
            self.config.base_url.trim_end_matches('/'),
            self.root()
        );
        let response = self.send(self.client.delete(&url)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error("clear", response.status()))
        }
    }

    fn supports_prefix_delete(&self) -> bool {
        true
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            entries: None,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: 0,
        }
    }
}

impl std::fmt::Debug for HttpKvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKvBackend")
            .field("base_url", &self.config.base_url)
            .field("root", &self.config.root)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config() {
        let config = HttpKvConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8500");
        assert!(config.token.is_none());
        assert_eq!(config.request_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_envelope_live() {
        let raw = encode_envelope(b"[1,2]", Duration::from_secs(60));
        assert_eq!(raw.len(), HEADER_LEN + 5);

        let now = Utc::now().timestamp_millis();
        let payload = decode_envelope(raw, now).unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"[1,2]")));
    }

    #[test]
    fn test_envelope_expired() {
        let raw = encode_envelope(b"x", Duration::from_secs(60));
        let later = Utc::now().timestamp_millis() + 61_000;
        assert_eq!(decode_envelope(raw, later).unwrap(), None);
    }

    #[test]
    fn test_envelope_truncated() {
        let result = decode_envelope(Bytes::from_static(b"abc"), 0);
        assert_matches!(result, Err(Error::CacheBackend(_)));
    }

    #[test]
    fn test_key_url_escapes_separators() {
        let backend = HttpKvBackend::new(HttpKvConfig {
            base_url: "http://kv.local:8500/".to_string(),
            root: "/locator/cache/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            backend.key_url("airports:nearest:1.0000"),
            "http://kv.local:8500/v1/kv/locator/cache/airports%3Anearest%3A1.0000"
        );
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_connection_error() {
        let backend = HttpKvBackend::new(HttpKvConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();

        let result = backend.get("airports:nearest:x").await;
        assert_matches!(result, Err(Error::CacheConnection(_)));
        assert_eq!(backend.stats().reads, 1);
    }
}
