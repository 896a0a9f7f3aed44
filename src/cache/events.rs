//! Cache event system.
//!
//! Chain events that make cached responses stale, and the queue they wait in
//! until the consumer turns them into invalidations.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_EVENT_QUEUE_LEN: &str = "tzquery_cache_event_queue_len";

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The indexer applied a new block.
    BlockApplied { level: i64 },
    /// The indexer rolled back to `level`.
    BlockReverted { level: i64 },
    /// Operator-requested flush, of everything or of keys under one path prefix.
    Flush { prefix: Option<String> },
}

/// In-memory event queue for cache invalidation.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn publish(&self, kind: EventKind) {
        let event = CacheEvent::new(kind, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?event.kind,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` events, oldest first.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
