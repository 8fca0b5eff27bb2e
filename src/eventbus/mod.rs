// src/eventbus/mod.rs

//! Cluster-wide config-change propagation with at-least-once delivery and
//! per-node idempotent application (spec.md section 4.B).

mod compactor;
mod handlers;
mod poller;

pub use compactor::EventCompactor;
pub use handlers::{EventHandler, HandlerRegistry};
pub use poller::EventPoller;

use crate::core::GatewayError;
use crate::model::ClusterEvent;
use crate::store::Store;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// The publisher-facing half of the bus. Cheaply cloneable; every component
/// that mutates shared config holds one of these to announce the change.
#[derive(Clone)]
pub struct EventBus {
    store: Arc<dyn Store>,
    tenant_id: String,
    self_node_id: String,
}

impl EventBus {
    pub fn new(store: Arc<dyn Store>, tenant_id: impl Into<String>, self_node_id: impl Into<String>) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            self_node_id: self_node_id.into(),
        }
    }

    /// Writes an event row with `sourceNodeId = self`. Publishers never ACK
    /// their own event (spec.md section 4.B invariant).
    pub async fn publish<P: Serialize + Sync>(
        &self,
        event_type: impl Into<String>,
        payload: &P,
    ) -> Result<String, GatewayError> {
        let event_id = Uuid::new_v4().to_string();
        let event = ClusterEvent {
            event_id: event_id.clone(),
            source_node_id: self.self_node_id.clone(),
            event_type: event_type.into(),
            payload: serde_json::to_value(payload)
                .map_err(|e| GatewayError::Internal(e.to_string()))?,
            event_time: now_millis(),
        };
        crate::store::StoreExt::insert(
            self.store.as_ref(),
            crate::model::cluster_event::TABLE_EVENT,
            &self.tenant_id,
            &event_id,
            &event,
        )
        .await?;
        Ok(event_id)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
