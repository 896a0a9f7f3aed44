//! Cache trigger service.
//!
//! Entry point for anything that learns about chain changes: publishes the
//! event and optionally applies it right away.

use std::sync::Arc;

use tracing::debug;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish an event; with `consume_now` the queue is drained before returning.
    pub fn trigger(&self, kind: EventKind, consume_now: bool) {
        if !self.config.enable {
            debug!(event_kind = ?kind, "Cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume_all();
        }
    }

    pub fn block_applied(&self, level: i64) {
        self.trigger(EventKind::BlockApplied { level }, true);
    }

    pub fn block_reverted(&self, level: i64) {
        self.trigger(EventKind::BlockReverted { level }, true);
    }

    pub fn flush(&self, prefix: Option<String>) {
        self.trigger(EventKind::Flush { prefix }, true);
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::CacheKey;
    use crate::cache::store::ResponseCache;

    fn create_trigger(config: CacheConfig) -> CacheTrigger {
        let cache = Arc::new(ResponseCache::new(&config));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(config.clone(), cache, queue.clone()));
        CacheTrigger::new(config, queue, consumer)
    }

    #[test]
    fn trigger_without_consuming_leaves_event_queued() {
        let trigger = create_trigger(CacheConfig::default());
        trigger.trigger(EventKind::Flush { prefix: None }, false);
        assert_eq!(trigger.queue().len(), 1);
    }

    #[test]
    fn trigger_respects_disabled_config() {
        let trigger = create_trigger(CacheConfig {
            enable: false,
            ..Default::default()
        });
        trigger.block_applied(1);
        assert!(trigger.queue().is_empty());
    }

    #[test]
    fn convenience_methods_consume_immediately() {
        let trigger = create_trigger(CacheConfig::default());
        let cache = trigger.consumer().cache().clone();
        cache.set(CacheKey::builder("/v1/head").finish(), &1).unwrap();

        trigger.block_applied(7);
        assert!(cache.is_empty());
        assert_eq!(trigger.consumer().level(), Some(7));

        trigger.block_reverted(6);
        trigger.flush(Some("/v1/accounts".into()));
        assert!(trigger.queue().is_empty());
        assert_eq!(trigger.consumer().level(), Some(6));
    }
}
