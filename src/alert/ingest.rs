// src/alert/ingest.rs

//! Ingest: callers emit an `AlertLog` (PENDING, unsent) through a bounded
//! channel into a shared buffer; `IngestWorker` drains the channel and
//! flushes on batch-full, `FlushWorker` forces a flush on its own ticker so
//! a trickle of alerts doesn't sit unpersisted (spec.md section 4.G step 1).

use crate::model::alert::{AlertLog, AlertSendStatus, TABLE_LOG};
use crate::store::Store;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AlertEmitter {
    tx: mpsc::Sender<AlertLog>,
}

impl AlertEmitter {
    /// Enqueues an alert for delivery. Callers set `send_status` to
    /// `Pending`; overflow drops the oldest entry rather than blocking the
    /// caller, mirroring the access-log sender's overflow policy.
    pub fn emit(&self, mut log: AlertLog) {
        log.send_status = AlertSendStatus::Pending;
        if let Err(mpsc::error::TrySendError::Full(log)) = self.tx.try_send(log) {
            warn!("alert ingest channel saturated, dropping alert {}", log.alert_log_id);
            crate::core::metrics::PrometheusMeter.incr_counter("alert_dropped_total", &[]);
        }
    }
}

pub fn bounded_channel(capacity: usize) -> (AlertEmitter, mpsc::Receiver<AlertLog>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AlertEmitter { tx }, rx)
}

/// The buffer `IngestWorker` and `FlushWorker` both drain. Kept separate
/// from either worker so ownership of "when to flush" can live in two
/// independent tickers without a lock around a whole task.
#[derive(Clone, Default)]
pub struct AlertBuffer {
    rows: Arc<Mutex<Vec<AlertLog>>>,
}

impl AlertBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, log: AlertLog) -> usize {
        let mut guard = self.rows.lock();
        guard.push(log);
        guard.len()
    }

    fn take(&self) -> Vec<AlertLog> {
        std::mem::take(&mut *self.rows.lock())
    }

    pub async fn flush(&self, store: &Arc<dyn Store>, tenant_id: &str) {
        let buffered = self.take();
        if buffered.is_empty() {
            return;
        }
        let rows: Vec<(String, serde_json::Value)> = buffered
            .iter()
            .map(|log| (log.alert_log_id.clone(), serde_json::to_value(log).expect("AlertLog always serializes")))
            .collect();
        if let Err(e) = store.batch_insert_raw(TABLE_LOG, tenant_id, rows).await {
            error!("alert-log batch insert failed, dropping {} entries: {}", buffered.len(), e);
            crate::core::metrics::PrometheusMeter.incr_counter("alert_dropped_total", &[]);
        }
    }
}

/// Drains the ingest channel into the shared buffer, flushing immediately
/// once `batch_size` accumulates. Exits once the channel closes, flushing
/// whatever remains.
pub struct IngestWorker {
    store: Arc<dyn Store>,
    tenant_id: String,
    rx: mpsc::Receiver<AlertLog>,
    buffer: AlertBuffer,
    batch_size: usize,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn Store>,
        tenant_id: impl Into<String>,
        rx: mpsc::Receiver<AlertLog>,
        buffer: AlertBuffer,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            rx,
            buffer,
            batch_size,
        }
    }

    pub async fn run(mut self) {
        while let Some(log) = self.rx.recv().await {
            let len = self.buffer.push(log);
            if len >= self.batch_size {
                self.buffer.flush(&self.store, &self.tenant_id).await;
            }
        }
        self.buffer.flush(&self.store, &self.tenant_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PageRequest, StoreExt};
    use std::time::Duration;

    fn sample_log(id: &str) -> AlertLog {
        AlertLog {
            alert_log_id: id.to_string(),
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
        }
    }

    #[tokio::test]
    async fn flushes_on_batch_full() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (emitter, rx) = bounded_channel(100);
        let buffer = AlertBuffer::new();
        let worker = IngestWorker::new(store.clone(), "t1", rx, buffer, 2);
        let handle = tokio::spawn(worker.run());

        emitter.emit(sample_log("a"));
        emitter.emit(sample_log("b"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let page: crate::store::PageResult<AlertLog> = store
            .query(TABLE_LOG, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        drop(emitter);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn channel_close_flushes_remainder() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (emitter, rx) = bounded_channel(100);
        let buffer = AlertBuffer::new();
        let worker = IngestWorker::new(store.clone(), "t1", rx, buffer, 100);
        let handle = tokio::spawn(worker.run());

        emitter.emit(sample_log("a"));
        drop(emitter);
        handle.await.unwrap();

        let page: crate::store::PageResult<AlertLog> = store
            .query(TABLE_LOG, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
