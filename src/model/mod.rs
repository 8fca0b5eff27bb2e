// src/model/mod.rs

//! Persistent entities (spec.md section 3). Every entity carries the
//! `AuditFields` common to all tables and a normative `TABLE` name constant
//! matching spec.md section 6's `HUB_*` naming.

pub mod access_log;
pub mod alert;
pub mod audit;
pub mod cluster_event;
pub mod gateway_instance;
pub mod route;
pub mod service;
pub mod tunnel;

pub use access_log::AccessLog;
pub use alert::{AlertChannelType, AlertConfig, AlertLog, AlertSendStatus, AlertTemplate, DisplayFormat};
pub use audit::{ActiveFlag, AuditFields};
pub use cluster_event::{AckStatus, ClusterEvent, ClusterEventAck};
pub use gateway_instance::{GatewayInstance, GatewayInstanceStatus};
pub use route::{FilterAction, FilterRef, FilterType, MatchType, RouteConfig};
pub use service::{HealthCheckSpec, HealthStatus, InstanceStatus, LoadBalanceStrategy, ServiceDefinition, ServiceInstance};
pub use tunnel::{TunnelProtocol, TunnelStaticNode, TunnelStaticServer};
