// src/tunnel/health.rs

//! Per-node health checking for static tunnel targets: TCP connect or HTTP
//! GET probes on a fixed interval, consecutive-failure/-success thresholds
//! flip `TunnelStaticNode.healthy` (spec.md section 4.H).

use crate::model::tunnel::{TunnelStaticNode, TABLE_NODE};
use crate::model::HealthCheckSpec;
use crate::store::{Store, StoreExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, warn};

pub struct HealthCheckWorker {
    store: Arc<dyn Store>,
    tenant_id: String,
    node_id: String,
    spec: HealthCheckSpec,
    http_client: reqwest::Client,
}

impl HealthCheckWorker {
    pub fn new(store: Arc<dyn Store>, tenant_id: impl Into<String>, node_id: impl Into<String>, spec: HealthCheckSpec) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            node_id: node_id.into(),
            spec,
            http_client: reqwest::Client::new(),
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        if !self.spec.enabled {
            return;
        }
        let mut ticker = tokio::time::interval(Duration::from_millis(self.spec.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;
        let mut consecutive_successes = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(node_id = %self.node_id, "tunnel health check worker shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    match self.probe_once().await {
                        Ok(true) => {
                            consecutive_successes += 1;
                            consecutive_failures = 0;
                            if consecutive_successes >= self.spec.healthy_threshold {
                                self.set_healthy(true).await;
                            }
                        }
                        _ => {
                            consecutive_failures += 1;
                            consecutive_successes = 0;
                            if consecutive_failures >= self.spec.unhealthy_threshold {
                                self.set_healthy(false).await;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn probe_once(&self) -> Result<bool, crate::core::GatewayError> {
        let node: TunnelStaticNode = self.store.query_one(TABLE_NODE, &self.tenant_id, &self.node_id).await?;
        let addr = format!("{}:{}", node.target_host, node.target_port);
        let probe_timeout = Duration::from_millis(self.spec.timeout_ms);

        if self.spec.path.is_empty() {
            let result = timeout(probe_timeout, TcpStream::connect(&addr)).await;
            Ok(matches!(result, Ok(Ok(_))))
        } else {
            let url = format!("http://{addr}{}", self.spec.path);
            let result = self.http_client.get(&url).timeout(probe_timeout).send().await;
            Ok(matches!(result, Ok(response) if response.status().is_success()))
        }
    }

    async fn set_healthy(&self, healthy: bool) {
        if let Ok(mut node) = self.store.query_one::<TunnelStaticNode>(TABLE_NODE, &self.tenant_id, &self.node_id).await {
            if node.healthy != healthy {
                node.healthy = healthy;
                if let Err(e) = self.store.update(TABLE_NODE, &self.tenant_id, &self.node_id, &node).await {
                    warn!(node_id = %self.node_id, error = %e, "failed to persist tunnel node health");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditFields;
    use crate::store::MemoryStore;

    fn node(healthy: bool) -> TunnelStaticNode {
        TunnelStaticNode {
            node_id: "n1".to_string(),
            server_id: "s1".to_string(),
            target_host: "127.0.0.1".to_string(),
            target_port: 1,
            weight: 1,
            healthy,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[tokio::test]
    async fn unreachable_target_counts_as_failure() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert(TABLE_NODE, "t1", "n1", &node(true)).await.unwrap();
        let spec = HealthCheckSpec {
            enabled: true,
            path: String::new(),
            interval_ms: 10,
            timeout_ms: 50,
            healthy_threshold: 1,
            unhealthy_threshold: 1,
        };
        let worker = HealthCheckWorker::new(store.clone(), "t1", "n1", spec);
        let probe = worker.probe_once().await.unwrap();
        assert!(!probe);
    }
}
