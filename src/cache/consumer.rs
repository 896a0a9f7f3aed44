//! Cache consumer for executing invalidation plans.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::lock::mutex_lock;
use super::planner::InvalidationPlan;
use super::store::ResponseCache;

const SOURCE: &str = "cache::consumer";
const METRIC_CACHE_CONSUME_MS: &str = "tzquery_cache_consume_ms";

/// Drains the event queue and applies the resulting plan to the response cache.
pub struct CacheConsumer {
    config: CacheConfig,
    cache: Arc<ResponseCache>,
    queue: Arc<EventQueue>,
    level: Mutex<Option<i64>>,
}

impl CacheConsumer {
    pub fn new(config: CacheConfig, cache: Arc<ResponseCache>, queue: Arc<EventQueue>) -> Self {
        Self {
            config,
            cache,
            queue,
            level: Mutex::new(None),
        }
    }

    /// Consume one batch of pending events.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub fn consume(&self) -> bool {
        let started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let invalidated = if plan.clear_all {
            self.cache.invalidate_all()
        } else {
            plan.prefixes
                .iter()
                .map(|prefix| self.cache.invalidate_prefix(prefix))
                .sum()
        };
        if let Some(level) = plan.level {
            *mutex_lock(&self.level, SOURCE, "consume") = Some(level);
        }

        info!(event_count, invalidated, "Cache consumption complete");
        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        true
    }

    /// Consume until the queue is empty.
    pub fn consume_all(&self) -> usize {
        let mut batches = 0;
        while self.consume() {
            batches += 1;
        }
        batches
    }

    /// Chain level of the most recent block event consumed.
    pub fn level(&self) -> Option<i64> {
        *mutex_lock(&self.level, SOURCE, "level")
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}
