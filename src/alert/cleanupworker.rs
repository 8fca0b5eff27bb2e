// src/alert/cleanupworker.rs

//! Retention GC for alert logs, the same shape as
//! `logpipeline::gc::RetentionGcTask` (spec.md section 4.G step 6).

use crate::model::alert::{AlertLog, TABLE_LOG};
use crate::store::{PageRequest, Store, StoreExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct CleanupWorker {
    store: Arc<dyn Store>,
    tenant_id: String,
    cleanup_interval: Duration,
    retention: Duration,
}

impl CleanupWorker {
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
                    debug!("alert log retention GC shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!("alert log retention sweep failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<usize, crate::core::GatewayError> {
        let horizon = crate::eventbus::now_millis() - i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        let page: crate::store::PageResult<AlertLog> = self
            .store
            .query(TABLE_LOG, &self.tenant_id, "all", PageRequest::new(0, usize::MAX / 2))
            .await?;

        let mut deleted = 0;
        for log in page.items.into_iter().filter(|l| l.add_time < horizon) {
            self.store.delete(TABLE_LOG, &self.tenant_id, &log.alert_log_id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alert::AlertSendStatus;
    use crate::store::MemoryStore;

    fn log_at(id: &str, add_time: i64) -> AlertLog {
        AlertLog {
            alert_log_id: id.to_string(),
            channel_name: "ops".to_string(),
            level: "critical".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec![],
            extra: serde_json::Value::Null,
            send_status: AlertSendStatus::Success,
            send_attempts: 1,
            send_time: Some(add_time),
            send_result: None,
            error: None,
            add_time,
        }
    }

    #[tokio::test]
    async fn sweeps_logs_older_than_horizon() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert(TABLE_LOG, "t1", "old", &log_at("old", 0)).await.unwrap();
        store
            .insert(TABLE_LOG, "t1", "fresh", &log_at("fresh", crate::eventbus::now_millis()))
            .await
            .unwrap();

        let gc = CleanupWorker::new(store.clone(), "t1", Duration::from_secs(1), Duration::from_secs(3600));
        let deleted = gc.sweep_once().await.unwrap();
        assert_eq!(deleted, 1);
    }
}
