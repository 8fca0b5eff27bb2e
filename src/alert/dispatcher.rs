// src/alert/dispatcher.rs

//! Owns the alert pipeline's background workers and exposes the single
//! `emit` entry point the rest of the gateway calls to raise an alert
//! (spec.md section 4.G).

use super::cleanupworker::CleanupWorker;
use super::flushworker::FlushWorker;
use super::ingest::{bounded_channel, AlertBuffer, AlertEmitter, IngestWorker};
use super::manager::ChannelManager;
use super::sendworker::SendWorker;
use super::template::{self, RenderedMessage};
use crate::model::alert::{AlertLog, AlertSendStatus, AlertTemplate};
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct AlertDispatcherConfig {
    pub tenant_id: String,
    pub ingest_buffer: usize,
    pub ingest_batch_size: usize,
    pub ingest_flush_interval: Duration,
    pub send_poll_interval: Duration,
    pub send_batch_size: usize,
    pub send_timeout: Duration,
    pub cleanup_interval: Duration,
    pub retention: Duration,
}

/// The alert dispatcher's public face: `emit` renders a message (via
/// template or raw content) and hands it to the ingest buffer; everything
/// downstream (persistence, rate limiting, channel delivery, retries,
/// retention) runs on background workers this struct owns.
pub struct AlertDispatcher {
    emitter: AlertEmitter,
    channels: Arc<ChannelManager>,
}

impl AlertDispatcher {
    /// Spawns the ingest, send, and cleanup workers and returns a handle
    /// that can emit alerts. `channels` should already be populated from
    /// the current `AlertConfig` rows; callers reload it via
    /// `ChannelManager::upsert` as `AlertConfigChanged` events arrive.
    pub fn spawn(
        store: Arc<dyn Store>,
        channels: Arc<ChannelManager>,
        config: AlertDispatcherConfig,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Self {
        let (emitter, rx) = bounded_channel(config.ingest_buffer);
        let buffer = AlertBuffer::new();

        let ingest = IngestWorker::new(store.clone(), config.tenant_id.clone(), rx, buffer.clone(), config.ingest_batch_size);
        tokio::spawn(ingest.run());

        let flush = FlushWorker::new(store.clone(), config.tenant_id.clone(), buffer, config.ingest_flush_interval);
        tokio::spawn(flush.run(shutdown_tx.subscribe()));

        let send_worker = Arc::new(SendWorker::new(
            store.clone(),
            channels.clone(),
            config.tenant_id.clone(),
            config.send_poll_interval,
            config.send_batch_size,
            config.send_timeout,
        ));
        tokio::spawn(send_worker.run(shutdown_tx.subscribe()));

        let cleanup = CleanupWorker::new(store, config.tenant_id, config.cleanup_interval, config.retention);
        tokio::spawn(cleanup.run(shutdown_tx.subscribe()));

        Self { emitter, channels }
    }

    /// Renders `template` (or passes `content` through raw when no template
    /// is given) and enqueues a PENDING alert log for delivery.
    pub fn emit(
        &self,
        channel_name: impl Into<String>,
        level: impl Into<String>,
        template: Option<&AlertTemplate>,
        table_data: &HashMap<String, String>,
        raw_title: &str,
        raw_content: &str,
        tags: Vec<String>,
        extra: serde_json::Value,
    ) {
        let rendered: RenderedMessage = match template {
            Some(tpl) => template::render(tpl, table_data),
            None => template::render_raw(raw_title, raw_content),
        };
        let log = AlertLog {
            alert_log_id: Uuid::new_v4().to_string(),
            channel_name: channel_name.into(),
            level: level.into(),
            title: rendered.title,
            content: rendered.body,
            tags,
            extra,
            send_status: AlertSendStatus::Pending,
            send_attempts: 0,
            send_time: None,
            send_result: None,
            error: None,
            add_time: crate::eventbus::now_millis(),
        };
        self.emitter.emit(log);
    }

    pub fn channels(&self) -> Arc<ChannelManager> {
        self.channels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PageRequest, StoreExt};

    #[tokio::test]
    async fn emit_persists_pending_log() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let channels = Arc::new(ChannelManager::new());
        let (shutdown_tx, _rx) = broadcast::channel(1);
        let dispatcher = AlertDispatcher::spawn(
            store.clone(),
            channels,
            AlertDispatcherConfig {
                tenant_id: "t1".to_string(),
                ingest_buffer: 100,
                ingest_batch_size: 1,
                ingest_flush_interval: Duration::from_millis(10),
                send_poll_interval: Duration::from_secs(60),
                send_batch_size: 10,
                send_timeout: Duration::from_secs(1),
                cleanup_interval: Duration::from_secs(60),
                retention: Duration::from_secs(3600),
            },
            &shutdown_tx,
        );

        dispatcher.emit(
            "ops",
            "critical",
            None,
            &HashMap::new(),
            "svc down",
            "checkout is unhealthy",
            vec!["availability".to_string()],
            serde_json::Value::Null,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let page: crate::store::PageResult<AlertLog> = store
            .query(crate::model::alert::TABLE_LOG, "t1", "", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "svc down");
    }
}
