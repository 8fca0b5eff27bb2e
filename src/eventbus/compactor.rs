// src/eventbus/compactor.rs

//! Retention worker: periodically deletes events and ACKs older than a
//! configured horizon (spec.md section 4.B "Compaction", default 72 h).

use crate::model::{ClusterEvent, ClusterEventAck};
use crate::store::{PageRequest, Store, StoreExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct EventCompactor {
    store: Arc<dyn Store>,
    tenant_id: String,
    cleanup_interval: Duration,
    retention: Duration,
}

impl EventCompactor {
    pub fn new(
        store: Arc<dyn Store>,
        tenant_id: impl Into<String>,
        cleanup_interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            cleanup_interval,
            retention,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("event compactor shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.compact_once().await {
                        warn!("event compaction pass failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn compact_once(&self) -> Result<usize, crate::core::GatewayError> {
        let horizon = crate::eventbus::now_millis()
            - i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);

        let events: crate::store::PageResult<ClusterEvent> = self
            .store
            .query(
                crate::model::cluster_event::TABLE_EVENT,
                &self.tenant_id,
                "all",
                PageRequest::new(0, usize::MAX / 2),
            )
            .await?;
        let acks: crate::store::PageResult<ClusterEventAck> = self
            .store
            .query(
                crate::model::cluster_event::TABLE_EVENT_ACK,
                &self.tenant_id,
                "all",
                PageRequest::new(0, usize::MAX / 2),
            )
            .await?;

        let mut deleted = 0;
        for event in events.items.into_iter().filter(|e| e.event_time < horizon) {
            self.store
                .delete(crate::model::cluster_event::TABLE_EVENT, &self.tenant_id, &event.event_id)
                .await?;
            deleted += 1;
        }
        for ack in acks.items.into_iter().filter(|a| a.event_time < horizon) {
            let key = format!("{}:{}", ack.event_id, ack.node_id);
            self.store
                .delete(crate::model::cluster_event::TABLE_EVENT_ACK, &self.tenant_id, &key)
                .await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}
