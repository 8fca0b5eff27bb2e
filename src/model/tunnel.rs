// src/model/tunnel.rs

//! Static tunnel mappings (spec.md section 3 / section 4.H).

use super::audit::AuditFields;
use serde::{Deserialize, Serialize};

pub const TABLE_SERVER: &str = "HUB_TUNNEL_STATIC_SERVER";
pub const TABLE_NODE: &str = "HUB_TUNNEL_STATIC_NODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelProtocol {
    Tcp,
    Udp,
}

/// A single listening tunnel on a gateway instance, mapping a public port
/// to one or more backing nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStaticServer {
    pub server_id: String,
    pub gateway_instance_id: String,
    pub listen_port: u16,
    pub protocol: TunnelProtocol,
    pub health_check: super::HealthCheckSpec,
    pub enabled: bool,
    pub audit: AuditFields,
}

/// A backing node a `TunnelStaticServer` forwards connections to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStaticNode {
    pub node_id: String,
    pub server_id: String,
    pub target_host: String,
    pub target_port: u16,
    pub weight: u32,
    pub healthy: bool,
    pub audit: AuditFields,
}
