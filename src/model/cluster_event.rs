// src/model/cluster_event.rs

//! Cluster config-change events and their per-node acknowledgements
//! (spec.md section 3 / section 4.B).

use serde::{Deserialize, Serialize};

pub const TABLE_EVENT: &str = "HUB_CLUSTER_EVENT";
pub const TABLE_EVENT_ACK: &str = "HUB_CLUSTER_EVENT_ACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AckStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub event_id: String,
    pub source_node_id: String,
    pub event_type: String,
    /// Opaque event-type-specific payload (route/service/alert-config diff, ...).
    pub payload: serde_json::Value,
    pub event_time: i64,
}

/// Keyed on `(event_id, node_id)`: exactly one row per node that has
/// processed a given event (spec.md section 4.B invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEventAck {
    pub event_id: String,
    pub node_id: String,
    pub ack_status: AckStatus,
    /// Denormalized copy of the acked event's `eventTime`, so the poller's
    /// watermark query never has to join back to the event table.
    pub event_time: i64,
    pub ack_time: i64,
    pub error: Option<String>,
}

impl ClusterEventAck {
    pub fn key(&self) -> (String, String) {
        (self.event_id.clone(), self.node_id.clone())
    }
}
