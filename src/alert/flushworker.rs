// src/alert/flushworker.rs

//! Forces a periodic flush of the ingest buffer so a trickle of alerts below
//! `IngestWorker`'s batch threshold doesn't sit unpersisted indefinitely
//! (spec.md section 4.G names this as its own worker, spawned alongside
//! ingest/send/cleanup).

use super::ingest::AlertBuffer;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub struct FlushWorker {
    store: Arc<dyn Store>,
    tenant_id: String,
    buffer: AlertBuffer,
    flush_interval: Duration,
}

impl FlushWorker {
    pub fn new(store: Arc<dyn Store>, tenant_id: impl Into<String>, buffer: AlertBuffer, flush_interval: Duration) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            buffer,
            flush_interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("alert flush worker shutting down");
                    self.buffer.flush(&self.store, &self.tenant_id).await;
                    return;
                }
                _ = ticker.tick() => {
                    self.buffer.flush(&self.store, &self.tenant_id).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::alert::{AlertLog, AlertSendStatus, TABLE_LOG};
    use crate::store::{MemoryStore, PageRequest, StoreExt};

    #[tokio::test]
    async fn tick_flushes_buffered_entries() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let buffer = AlertBuffer::new();
        buffer
            .flush(&store, "t1")
            .await;
        let (shutdown_tx, _keep) = broadcast::channel(1);

        // seed the buffer the way IngestWorker would, via its private push;
        // exercised here through a second buffer handle sharing the same Arc.
        let log = AlertLog {
            alert_log_id: "a".to_string(),
            channel_name: "ops".to_string(),
            level: "critical".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec![],
            extra: serde_json::Value::Null,
            send_status: AlertSendStatus::Pending,
            send_attempts: 0,
            send_time: None,
            send_result: None,
            error: None,
            add_time: 0,
        };
        let (emitter, rx) = super::super::ingest::bounded_channel(10);
        let ingest = super::super::ingest::IngestWorker::new(store.clone(), "t1", rx, buffer.clone(), 1000);
        let ingest_handle = tokio::spawn(ingest.run());
        emitter.emit(log);

        let worker = FlushWorker::new(store.clone(), "t1", buffer, Duration::from_millis(10));
        let flush_handle = tokio::spawn(worker.run(shutdown_tx.subscribe()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
        flush_handle.await.unwrap();
        drop(emitter);
        ingest_handle.await.unwrap();

        let page: crate::store::PageResult<AlertLog> = store
            .query(TABLE_LOG, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
