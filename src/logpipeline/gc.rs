// src/logpipeline/gc.rs

//! RetentionGC worker: deletes access-log rows older than the retention
//! horizon on a fixed tick (spec.md section 4.F).

use crate::model::AccessLog;
use crate::store::{PageRequest, Store, StoreExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct RetentionGcTask {
    store: Arc<dyn Store>,
    tenant_id: String,
    cleanup_interval: Duration,
    retention: Duration,
}

impl RetentionGcTask {
    pub fn new(store: Arc<dyn Store>, tenant_id: impl Into<String>, cleanup_interval: Duration, retention: Duration) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            cleanup_interval,
            retention,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("access-log retention GC shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!("access-log retention sweep failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<usize, crate::core::GatewayError> {
        let horizon = crate::eventbus::now_millis() - i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        let page: crate::store::PageResult<AccessLog> = self
            .store
            .query(crate::model::access_log::TABLE, &self.tenant_id, "all", PageRequest::new(0, usize::MAX / 2))
            .await?;

        let mut deleted = 0;
        for log in page.items.into_iter().filter(|l| l.received_at < horizon) {
            self.store
                .delete(crate::model::access_log::TABLE, &self.tenant_id, &log.access_log_id)
                .await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn log_at(id: &str, received_at: i64) -> AccessLog {
        AccessLog {
            access_log_id: id.to_string(),
            tenant_id: "t1".to_string(),
            gateway_instance_id: "gw1".to_string(),
            route_id: None,
            service_id: None,
            upstream_instance_id: None,
            trace_id: "tr".to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            path: "/".to_string(),
            query: None,
            protocol: "HTTP/1.1".to_string(),
            request_headers_size: 0,
            request_body_size: 0,
            response_headers_size: 0,
            response_body_size: 0,
            upstream_status: Some(200),
            gateway_status: 200,
            error_code: None,
            error_message: None,
            matched_filter_ids: vec![],
            retry_count: 0,
            received_at,
            proxy_start_at: None,
            backend_start_at: None,
            backend_recv_at: None,
            response_sent_at: None,
            finished_at: received_at,
            add_time: received_at,
        }
    }

    #[tokio::test]
    async fn sweeps_logs_older_than_horizon() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .insert(crate::model::access_log::TABLE, "t1", "old", &log_at("old", 0))
            .await
            .unwrap();
        store
            .insert(
                crate::model::access_log::TABLE,
                "t1",
                "fresh",
                &log_at("fresh", crate::eventbus::now_millis()),
            )
            .await
            .unwrap();

        let gc = RetentionGcTask::new(store.clone(), "t1", Duration::from_secs(1), Duration::from_secs(3600));
        let deleted = gc.sweep_once().await.unwrap();
        assert_eq!(deleted, 1);
    }
}
