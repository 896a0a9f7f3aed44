//! Response cache storage.
//!
//! Serialised response bodies keyed by [`CacheKey`], bounded by entry count and
//! by total payload size. Least recently used entries go first.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub(crate) const METRIC_CACHE_HIT: &str = "tzquery_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "tzquery_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "tzquery_cache_evict_total";
pub(crate) const METRIC_CACHE_INVALIDATE: &str = "tzquery_cache_invalidate_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to serialise response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One stored response body.
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub body: Bytes,
    pub content_type: &'static str,
    pub stored_at: Instant,
    pub ttl: Option<Duration>,
}

impl CachedPayload {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(self.stored_at) >= ttl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner {
    entries: LruCache<CacheKey, CachedPayload>,
    bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> Option<CachedPayload> {
        let removed = self.entries.pop(key)?;
        self.bytes -= removed.body.len();
        Some(removed)
    }
}

/// Shared cache of serialised query responses.
pub struct ResponseCache {
    inner: RwLock<Inner>,
    max_entries: usize,
    max_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    /// Bumped by every invalidation, under the write lock.
    generation: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let max_entries = config.response_limit_non_zero();
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(max_entries),
                bytes: 0,
            }),
            max_entries: max_entries.get(),
            max_bytes: config.max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// Current invalidation generation. Read it before computing a response
    /// and pass it to [`ResponseCache::set_unless_invalidated`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stored bytes for `key`, if present and not expired.
    pub fn try_get(&self, key: &CacheKey) -> Option<Bytes> {
        let hit = self.lookup(key);
        if hit.is_some() {
            self.record_hit(key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_MISS, "path" => key.path().to_string()).increment(1);
            debug!(cache = "response", outcome = "miss", key = %key, "Cache lookup");
        }
        hit
    }

    /// Second lookup after waiting on another request's miss. Only hits are counted.
    pub fn recheck(&self, key: &CacheKey) -> Option<Bytes> {
        let hit = self.lookup(key);
        if hit.is_some() {
            self.record_hit(key);
        }
        hit
    }

    fn record_hit(&self, key: &CacheKey) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT, "path" => key.path().to_string()).increment(1);
        debug!(cache = "response", outcome = "hit", key = %key, "Cache lookup");
    }

    fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let mut inner = rw_write(&self.inner, SOURCE, "lookup");
        let lookup = inner
            .entries
            .get(key)
            .map(|payload| (payload.is_expired(now), payload.body.clone()));
        match lookup {
            Some((true, _)) => {
                inner.remove(key);
                None
            }
            Some((false, body)) => Some(body),
            None => None,
        }
    }

    /// Serialise `value`, store it under `key` and hand back the same bytes.
    pub fn set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<Bytes, CacheError> {
        let body = Bytes::from(serde_json::to_vec(value)?);
        self.store(key, body.clone(), None, None);
        Ok(body)
    }

    /// Like [`ResponseCache::set`], but the entry expires after `ttl`.
    pub fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<Bytes, CacheError> {
        let body = Bytes::from(serde_json::to_vec(value)?);
        self.store(key, body.clone(), Some(ttl), None);
        Ok(body)
    }

    /// Serialise and store `value` unless an invalidation ran after `since`
    /// was read. The bytes are returned either way.
    pub fn set_unless_invalidated<T: Serialize + ?Sized>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Option<Duration>,
        since: u64,
    ) -> Result<Bytes, CacheError> {
        let body = Bytes::from(serde_json::to_vec(value)?);
        self.store(key, body.clone(), ttl, Some(since));
        Ok(body)
    }

    fn store(&self, key: CacheKey, body: Bytes, ttl: Option<Duration>, since: Option<u64>) {
        let size = body.len();
        let mut inner = rw_write(&self.inner, SOURCE, "store");

        if let Some(since) = since
            && since != self.generation.load(Ordering::Acquire)
        {
            debug!(
                cache = "response",
                key = %key,
                "Cache invalidated while computing response, not stored"
            );
            return;
        }

        if size > self.max_bytes {
            // Never serve a stale body for a key whose fresh one was too big to keep.
            inner.remove(&key);
            debug!(
                cache = "response",
                key = %key,
                size,
                max_bytes = self.max_bytes,
                "Payload exceeds cache budget, not stored"
            );
            return;
        }

        let payload = CachedPayload {
            body,
            content_type: JSON_CONTENT_TYPE,
            stored_at: Instant::now(),
            ttl,
        };
        let mut evicted = 0u64;
        if let Some((old_key, old)) = inner.entries.push(key.clone(), payload) {
            inner.bytes -= old.body.len();
            if old_key != key {
                evicted += 1;
            }
        }
        inner.bytes += size;

        while inner.bytes > self.max_bytes {
            let Some((_, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.bytes -= old.body.len();
            evicted += 1;
        }
        drop(inner);

        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT).increment(evicted);
            debug!(cache = "response", evicted, "Evicted least recently used entries");
        }
    }

    /// Drop every entry. Returns how many were removed.
    pub fn invalidate_all(&self) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "invalidate_all");
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.bytes = 0;
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(inner);

        counter!(METRIC_CACHE_INVALIDATE, "scope" => "all").increment(removed as u64);
        removed
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many were removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = rw_write(&self.inner, SOURCE, "invalidate_prefix");
        let doomed: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(key, _)| key.as_str().starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(inner);

        counter!(METRIC_CACHE_INVALIDATE, "scope" => "prefix").increment(doomed.len() as u64);
        doomed.len()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> usize {
        rw_read(&self.inner, SOURCE, "size_bytes").bytes
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let inner = rw_read(&self.inner, SOURCE, "stats");
            (inner.entries.len(), inner.bytes)
        };
        CacheStats {
            entries,
            bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
