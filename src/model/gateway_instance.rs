// src/model/gateway_instance.rs

//! `GatewayInstance` — a node's listener binding (spec.md section 3).

use super::audit::AuditFields;
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "HUB_GATEWAY_INSTANCE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayInstanceStatus {
    Stopped,
    Running,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayInstance {
    pub instance_id: String,
    pub listen_address: String,
    pub listen_port: u16,
    pub tls_enabled: bool,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub max_connections: usize,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub status: GatewayInstanceStatus,
    pub audit: AuditFields,
}
