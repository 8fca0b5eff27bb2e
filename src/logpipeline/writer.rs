// src/logpipeline/writer.rs

//! The LogWriter worker: drains a bounded ring buffer of `AccessLog` records
//! and batch-persists them (spec.md section 4.F).

use crate::model::AccessLog;
use crate::store::{Store, StoreExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// A fixed-capacity queue of unflushed `AccessLog` entries. Grounded in
/// `core/blocking.rs`'s `DashMap<Bytes, VecDeque<WaiterInfo>>` waiter
/// queues: a plain lock-guarded `VecDeque` is enough here since there is a
/// single consumer (the writer task), with a `Notify` standing in for the
/// waker `blocking.rs` threads through its `WaiterInfo`.
struct LogRing {
    buf: Mutex<VecDeque<AccessLog>>,
    capacity: usize,
    notify: Notify,
}

impl LogRing {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    /// Pushes `log`, evicting the oldest entry first if the ring is already
    /// at capacity. Returns the evicted entry's id, if one was dropped.
    fn push(&self, log: AccessLog) -> Option<String> {
        let mut buf = self.buf.lock();
        let evicted = if buf.len() >= self.capacity { buf.pop_front().map(|l| l.access_log_id) } else { None };
        buf.push_back(log);
        drop(buf);
        self.notify.notify_one();
        evicted
    }

    fn drain_into(&self, out: &mut Vec<AccessLog>, max: usize) {
        let mut buf = self.buf.lock();
        let n = buf.len().min(max.saturating_sub(out.len()));
        out.extend(buf.drain(..n));
    }

    fn len(&self) -> usize {
        self.buf.lock().len()
    }
}

pub struct LogWriterTask {
    store: Arc<dyn Store>,
    tenant_id: String,
    ring: Arc<LogRing>,
    batch_size: usize,
    flush_interval: Duration,
}

impl LogWriterTask {
    pub fn new(
        store: Arc<dyn Store>,
        tenant_id: impl Into<String>,
        ring: Arc<LogRing>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            ring,
            batch_size,
            flush_interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut buffer: Vec<AccessLog> = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.ring.drain_into(&mut buffer, self.batch_size);
            if buffer.len() >= self.batch_size {
                self.flush(&mut buffer).await;
                crate::core::metrics::PrometheusMeter.set_gauge("access_log_queue_depth", self.ring.len() as f64, &[]);
                continue;
            }

            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    self.ring.drain_into(&mut buffer, usize::MAX);
                    debug!("log writer shutting down, flushing {} buffered entries", buffer.len());
                    self.flush(&mut buffer).await;
                    return;
                }
                _ = ticker.tick() => {
                    self.ring.drain_into(&mut buffer, usize::MAX);
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = self.ring.notify.notified() => {}
            }
            crate::core::metrics::PrometheusMeter.set_gauge("access_log_queue_depth", self.ring.len() as f64, &[]);
        }
    }

    /// Persists the buffer inside one batch-insert; on failure retries
    /// once, then drops the batch with a counter increment — backpressure
    /// never propagates to the request path (spec.md section 4.F).
    async fn flush(&self, buffer: &mut Vec<AccessLog>) {
        if buffer.is_empty() {
            return;
        }
        let rows: Vec<(String, serde_json::Value)> = buffer
            .iter()
            .map(|log| (log.access_log_id.clone(), serde_json::to_value(log).expect("AccessLog always serializes")))
            .collect();

        if let Err(e) = self
            .store
            .batch_insert_raw(crate::model::access_log::TABLE, &self.tenant_id, rows.clone())
            .await
        {
            warn!("access-log batch insert failed, retrying once: {}", e);
            if let Err(e) = self
                .store
                .batch_insert_raw(crate::model::access_log::TABLE, &self.tenant_id, rows)
                .await
            {
                error!("access-log batch insert failed twice, dropping {} entries: {}", buffer.len(), e);
                crate::core::metrics::PrometheusMeter.incr_counter("access_log_dropped_total", &[]);
            }
        }
        buffer.clear();
    }
}

/// Builds the bounded ring buffer access-log producers write into. Overflow
/// drops the oldest entry rather than blocking the request path (spec.md
/// section 4.F, resolved per the "access-log overflow policy" open question
/// in favor of availability over completeness).
pub fn bounded_channel(capacity: usize) -> (AccessLogSender, Arc<LogRing>) {
    let ring = Arc::new(LogRing::new(capacity));
    (AccessLogSender { ring: ring.clone() }, ring)
}

#[derive(Clone)]
pub struct AccessLogSender {
    ring: Arc<LogRing>,
}

impl AccessLogSender {
    /// Enqueues `log`, dropping the oldest buffered entry if the ring is
    /// already at capacity. Never blocks the caller's request path.
    pub fn enqueue(&self, log: AccessLog) {
        if let Some(evicted_id) = self.ring.push(log) {
            warn!("access-log ring saturated, dropping oldest entry {}", evicted_id);
            crate::core::metrics::PrometheusMeter.incr_counter("access_log_dropped_total", &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PageRequest};

    fn sample_log(id: &str) -> AccessLog {
        AccessLog {
            access_log_id: id.to_string(),
            tenant_id: "t1".to_string(),
            gateway_instance_id: "gw1".to_string(),
            route_id: None,
            service_id: None,
            upstream_instance_id: None,
            trace_id: "tr1".to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            path: "/x".to_string(),
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
            received_at: 0,
            proxy_start_at: None,
            backend_start_at: None,
            backend_recv_at: None,
            response_sent_at: None,
            finished_at: 1,
            add_time: 1,
        }
    }

    #[tokio::test]
    async fn flushes_batch_once_batch_size_reached() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (tx, rx) = bounded_channel(100);
        let writer = LogWriterTask::new(store.clone(), "t1", rx, 2, Duration::from_secs(60));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(writer.run(shutdown_rx));

        tx.enqueue(sample_log("a"));
        tx.enqueue(sample_log("b"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let page: crate::store::PageResult<AccessLog> = store
            .query(crate::model::access_log::TABLE, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let _ = shutdown_tx.send(());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_buffer() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (tx, rx) = bounded_channel(100);
        let writer = LogWriterTask::new(store.clone(), "t1", rx, 100, Duration::from_secs(60));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(writer.run(shutdown_rx));

        tx.enqueue(sample_log("a"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = shutdown_tx.send(());
        handle.await.unwrap();

        let page: crate::store::PageResult<AccessLog> = store
            .query(crate::model::access_log::TABLE, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn ring_overflow_evicts_oldest_not_newest() {
        let ring = LogRing::new(2);
        assert_eq!(ring.push(sample_log("a")), None);
        assert_eq!(ring.push(sample_log("b")), None);
        // Ring is full; pushing "c" must evict "a" (oldest), not reject "c".
        assert_eq!(ring.push(sample_log("c")), Some("a".to_string()));

        let mut out = Vec::new();
        ring.drain_into(&mut out, 10);
        let ids: Vec<&str> = out.iter().map(|l| l.access_log_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn sender_enqueue_drops_oldest_on_saturation() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (tx, rx) = bounded_channel(2);
        // Large batch size and flush interval so nothing drains before we
        // inspect the ring's contents directly.
        let writer = LogWriterTask::new(store.clone(), "t1", rx.clone(), 100, Duration::from_secs(60));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(writer.run(shutdown_rx));

        tx.enqueue(sample_log("a"));
        tx.enqueue(sample_log("b"));
        tx.enqueue(sample_log("c"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = shutdown_tx.send(());
        handle.await.unwrap();

        let page: crate::store::PageResult<AccessLog> = store
            .query(crate::model::access_log::TABLE, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        let ids: Vec<String> = page.items.iter().map(|l| l.access_log_id.clone()).collect();
        assert!(!ids.contains(&"a".to_string()), "oldest entry should have been evicted");
        assert!(ids.contains(&"b".to_string()) && ids.contains(&"c".to_string()));
    }
}
