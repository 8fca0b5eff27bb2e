// src/eventbus/poller.rs

//! The event-poll worker: a fixed-tick loop that selects undelivered
//! events, dispatches them to registered handlers, and records a terminal
//! ACK for each (spec.md section 4.B "Poll protocol").
//!
//! Grounded in the teacher's ticker-driven background task shape (e.g.
//! `core::tasks::cache_gc` / `core::warden::worker::MasterMonitor::run`):
//! a `tokio::select!` between an `interval.tick()` and a shutdown signal.

use crate::eventbus::HandlerRegistry;
use crate::model::{AckStatus, ClusterEvent, ClusterEventAck};
use crate::store::{PageRequest, Store, StoreExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

const MAX_ERROR_LEN: usize = 1000;

pub struct EventPoller {
    store: Arc<dyn Store>,
    handlers: HandlerRegistry,
    tenant_id: String,
    self_node_id: String,
    poll_interval: Duration,
    batch: usize,
    replay_window: Duration,
    /// Cached watermark so a cold start only pays the "now - replayWindow"
    /// default once; updated after every successful ACK write.
    watermark: AtomicI64,
}

impl EventPoller {
    pub fn new(
        store: Arc<dyn Store>,
        handlers: HandlerRegistry,
        tenant_id: impl Into<String>,
        self_node_id: impl Into<String>,
        poll_interval: Duration,
        batch: usize,
        replay_window: Duration,
    ) -> Self {
        Self {
            store,
            handlers,
            tenant_id: tenant_id.into(),
            self_node_id: self_node_id.into(),
            poll_interval,
            batch,
            replay_window,
            watermark: AtomicI64::new(i64::MIN),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("event poller shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("event poll tick failed: {}", e);
                    }
                }
            }
        }
    }

    /// One iteration of the poll protocol. Public so tests and the
    /// supervisor can drive a deterministic tick without waiting on the
    /// ticker.
    pub async fn poll_once(&self) -> Result<usize, crate::core::GatewayError> {
        let last_event_time = self.watermark().await;

        let page: crate::store::PageResult<ClusterEvent> = self
            .store
            .query(
                crate::model::cluster_event::TABLE_EVENT,
                &self.tenant_id,
                "pending",
                PageRequest::new(0, self.batch.max(1) * 8),
            )
            .await?;

        let mut candidates: Vec<ClusterEvent> = Vec::new();
        for event in page.items {
            if event.source_node_id == self.self_node_id {
                continue;
            }
            if event.event_time < last_event_time {
                continue;
            }
            if self.has_terminal_ack(&event.event_id).await? {
                continue;
            }
            candidates.push(event);
        }
        candidates.sort_by(|a, b| (a.event_time, &a.event_id).cmp(&(b.event_time, &b.event_id)));
        candidates.truncate(self.batch);

        let mut processed = 0;
        for event in candidates {
            self.dispatch_and_ack(&event).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn has_terminal_ack(&self, event_id: &str) -> Result<bool, crate::core::GatewayError> {
        match self
            .store
            .query_one::<ClusterEventAck>(
                crate::model::cluster_event::TABLE_EVENT_ACK,
                &self.tenant_id,
                &ack_key(event_id, &self.self_node_id),
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(crate::store::StoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn dispatch_and_ack(&self, event: &ClusterEvent) -> Result<(), crate::core::GatewayError> {
        let handlers = self.handlers.handlers_for(&event.event_type);
        let (status, error) = if handlers.is_empty() {
            (AckStatus::Skipped, None)
        } else {
            let mut first_error = None;
            for handler in &handlers {
                if let Err(e) = handler.handle(&event.payload).await {
                    warn!(event_id = %event.event_id, event_type = %event.event_type, error = %e, "event handler failed");
                    first_error.get_or_insert(e);
                }
            }
            match first_error {
                Some(e) => (AckStatus::Failed, Some(truncate(&e, MAX_ERROR_LEN))),
                None => (AckStatus::Success, None),
            }
        };

        let ack = ClusterEventAck {
            event_id: event.event_id.clone(),
            node_id: self.self_node_id.clone(),
            ack_status: status,
            event_time: event.event_time,
            ack_time: crate::eventbus::now_millis(),
            error,
        };
        self.store
            .insert(
                crate::model::cluster_event::TABLE_EVENT_ACK,
                &self.tenant_id,
                &ack_key(&event.event_id, &self.self_node_id),
                &ack,
            )
            .await?;
        self.watermark.fetch_max(event.event_time, Ordering::SeqCst);
        Ok(())
    }

    async fn watermark(&self) -> i64 {
        let cached = self.watermark.load(Ordering::SeqCst);
        if cached != i64::MIN {
            return cached;
        }
        let cold_start = crate::eventbus::now_millis()
            - i64::try_from(self.replay_window.as_millis()).unwrap_or(i64::MAX);
        self.watermark.fetch_max(cold_start, Ordering::SeqCst);
        cold_start
    }
}

fn ack_key(event_id: &str, node_id: &str) -> String {
    format!("{event_id}:{node_id}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::{EventBus, HandlerRegistry};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct AlwaysOk(Arc<AtomicUsize>);

    #[async_trait]
    impl crate::eventbus::EventHandler for AlwaysOk {
        async fn handle(&self, _payload: &serde_json::Value) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl crate::eventbus::EventHandler for AlwaysFail {
        async fn handle(&self, _payload: &serde_json::Value) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn skips_self_published_events() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node-a");
        bus.publish("route_changed", &json!({"routeId": "r1"}))
            .await
            .unwrap();

        let handlers = HandlerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        handlers.register("route_changed", Arc::new(AlwaysOk(count.clone())));

        let poller = EventPoller::new(
            store,
            handlers,
            "t1",
            "node-a",
            Duration::from_secs(5),
            100,
            Duration::from_secs(3600 * 24),
        );
        let processed = poller.poll_once().await.unwrap();
        assert_eq!(processed, 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatches_to_other_nodes_and_acks_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node-a");
        bus.publish("route_changed", &json!({"routeId": "r1"}))
            .await
            .unwrap();

        let handlers = HandlerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        handlers.register("route_changed", Arc::new(AlwaysOk(count.clone())));

        let poller = EventPoller::new(
            store,
            handlers,
            "t1",
            "node-b",
            Duration::from_secs(5),
            100,
            Duration::from_secs(3600 * 24),
        );
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        // Re-polling finds the ACK already exists and redelivers nothing.
        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_handler_marks_ack_failed_and_does_not_retry() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node-a");
        bus.publish("route_changed", &json!({})).await.unwrap();

        let handlers = HandlerRegistry::new();
        handlers.register("route_changed", Arc::new(AlwaysFail));
        let poller = EventPoller::new(
            store.clone(),
            handlers,
            "t1",
            "node-b",
            Duration::from_secs(5),
            100,
            Duration::from_secs(3600 * 24),
        );
        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unhandled_event_type_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bus = EventBus::new(store.clone(), "t1", "node-a");
        bus.publish("unknown_type", &json!({})).await.unwrap();

        let poller = EventPoller::new(
            store,
            HandlerRegistry::new(),
            "t1",
            "node-b",
            Duration::from_secs(5),
            100,
            Duration::from_secs(3600 * 24),
        );
        assert_eq!(poller.poll_once().await.unwrap(), 1);
    }
}
