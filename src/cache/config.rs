//! Response cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_RESPONSE_LIMIT: usize = 4096;
const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_HEAD_TTL_SECONDS: u64 = 1;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;

/// Cache configuration from the `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Serve and store responses through the cache at all.
    pub enable: bool,
    /// Maximum number of cached responses.
    pub response_limit: usize,
    /// Maximum total size of cached payloads.
    pub max_bytes: usize,
    /// Lifetime of the cached chain head.
    pub head_ttl_seconds: u64,
    /// Let one request per key run the dispatcher while the others wait.
    pub coalesce_misses: bool,
    /// Auto-consume interval (ms) for queued invalidation events.
    pub auto_consume_interval_ms: u64,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable: true,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            max_bytes: DEFAULT_MAX_BYTES,
            head_ttl_seconds: DEFAULT_HEAD_TTL_SECONDS,
            coalesce_misses: true,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enable: settings.enable,
            response_limit: settings.response_limit,
            max_bytes: settings.max_bytes,
            head_ttl_seconds: settings.head_ttl_seconds,
            coalesce_misses: settings.coalesce_misses,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            consume_batch_limit: settings.consume_batch_limit,
        }
    }
}

impl CacheConfig {
    /// Returns the response limit as NonZeroUsize, clamping to 1 if zero.
    pub fn response_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.response_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn head_ttl(&self) -> Duration {
        Duration::from_secs(self.head_ttl_seconds)
    }
}
