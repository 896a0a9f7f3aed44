//! Response caching for the query API.
//!
//! Serialised responses are stored under deterministic keys built from the
//! decoded request, and dropped when chain events make them stale.
//!
//! ```toml
//! [cache]
//! enable = true
//! response_limit = 4096
//! max_bytes = 67108864
//! # ... see config.rs for all options
//! ```

mod config;
mod consumer;
mod events;
mod inflight;
mod keys;
mod lock;
mod planner;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use consumer::CacheConsumer;
pub use events::{CacheEvent, Epoch, EventKind, EventQueue};
pub use inflight::{InFlight, InFlightGuard};
pub use keys::{CacheKey, KeyBuilder, KeyPart, KeyWriter};
pub use planner::InvalidationPlan;
pub use store::{CacheError, CacheStats, CachedPayload, JSON_CONTENT_TYPE, ResponseCache};
pub use trigger::CacheTrigger;
