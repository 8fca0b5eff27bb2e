// src/model/service.rs

//! `ServiceDefinition` and its `ServiceInstance` members (spec.md section 3
//! / section 4.C).

use super::audit::AuditFields;
use serde::{Deserialize, Serialize};

pub const TABLE_SERVICE: &str = "HUB_SERVICE";
pub const TABLE_INSTANCE: &str = "HUB_SERVICE_INSTANCE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    Random,
    IpHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub enabled: bool,
    pub path: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/healthz".to_string(),
            interval_ms: 5_000,
            timeout_ms: 2_000,
            healthy_threshold: 2,
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub service_id: String,
    pub namespace_id: String,
    pub group_name: String,
    pub load_balance_strategy: LoadBalanceStrategy,
    pub health_check: HealthCheckSpec,
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_id: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub status: InstanceStatus,
    pub health: HealthStatus,
    pub last_heartbeat: i64,
    pub audit: AuditFields,
}

impl ServiceInstance {
    /// Eligible for load-balancing selection: administratively up and
    /// passing health checks (spec.md section 4.E invariant).
    pub fn is_eligible(&self) -> bool {
        self.status == InstanceStatus::Up && self.health == HealthStatus::Healthy
    }
}
