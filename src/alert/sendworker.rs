// src/alert/sendworker.rs

//! The SendWorker: polls PENDING alert logs in `addTime` order, rate-limits
//! and dispatches each through its channel adapter, and records rolling
//! delivery stats on the channel config (spec.md section 4.G steps 3-5).

use super::manager::ChannelManager;
use super::template::RenderedMessage;
use crate::core::ratelimit::TokenBucket;
use crate::model::alert::{AlertConfig, AlertLog, AlertSendStatus, TABLE_CONFIG, TABLE_LOG};
use crate::store::{PageRequest, Store, StoreExt};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

const MAX_ERROR_LEN: usize = 1000;
/// EMA smoothing factor for rolling send-duration tracking.
const DURATION_EMA_ALPHA: f64 = 0.1;

pub struct SendWorker {
    store: Arc<dyn Store>,
    channels: Arc<ChannelManager>,
    tenant_id: String,
    poll_interval: Duration,
    batch_size: usize,
    send_timeout: Duration,
    limiters: DashMap<String, Arc<TokenBucket>>,
}

impl SendWorker {
    pub fn new(
        store: Arc<dyn Store>,
        channels: Arc<ChannelManager>,
        tenant_id: impl Into<String>,
        poll_interval: Duration,
        batch_size: usize,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            channels,
            tenant_id: tenant_id.into(),
            poll_interval,
            batch_size,
            send_timeout,
            limiters: DashMap::new(),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!("alert send worker shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!("alert send tick failed: {}", e);
                    }
                }
            }
        }
    }

    /// One iteration: fetches PENDING logs oldest-first and sends each.
    /// Public so tests and the supervisor can drive a deterministic tick.
    pub async fn poll_once(&self) -> Result<usize, crate::core::GatewayError> {
        let page: crate::store::PageResult<AlertLog> = self
            .store
            .query(TABLE_LOG, &self.tenant_id, "pending", PageRequest::new(0, self.batch_size))
            .await?;

        let mut pending: Vec<AlertLog> = page
            .items
            .into_iter()
            .filter(|log| log.send_status == AlertSendStatus::Pending)
            .collect();
        pending.sort_by_key(|log| log.add_time);
        pending.truncate(self.batch_size);

        let processed = pending.len();
        for log in pending {
            self.send_one(log).await?;
        }
        Ok(processed)
    }

    async fn send_one(&self, mut log: AlertLog) -> Result<(), crate::core::GatewayError> {
        let Ok(config) = self
            .store
            .query_one::<AlertConfig>(TABLE_CONFIG, &self.tenant_id, &log.channel_name)
            .await
        else {
            warn!(channel = %log.channel_name, "alert channel config missing, failing log");
            self.transition_and_persist(&mut log, AlertSendStatus::Failed, Some("channel config not found".to_string()))
                .await?;
            return Ok(());
        };

        if !config.enabled {
            self.transition_and_persist(&mut log, AlertSendStatus::Failed, Some("channel disabled".to_string()))
                .await?;
            return Ok(());
        }

        let Some(channel) = self.channels.get(&log.channel_name) else {
            self.transition_and_persist(&mut log, AlertSendStatus::Failed, Some("channel adapter not built".to_string()))
                .await?;
            return Ok(());
        };

        if !self.limiter_for(&config).try_acquire() {
            debug!(channel = %log.channel_name, "alert rate-limited, leaving PENDING for next tick");
            return Ok(());
        }

        if !log.can_transition_to(AlertSendStatus::Sending) {
            return Ok(());
        }
        log.send_status = AlertSendStatus::Sending;
        log.send_attempts += 1;
        self.persist(&log).await?;

        let message = RenderedMessage { title: log.title.clone(), body: log.content.clone() };
        let started = Instant::now();
        let mut attempt = 0u32;
        let result = loop {
            let outcome = channel.send(&message, self.send_timeout).await;
            attempt += 1;
            match outcome {
                Ok(body) => break Ok(body),
                Err(e) if attempt <= config.max_retry_count => {
                    warn!(channel = %log.channel_name, attempt, error = %e, "alert send attempt failed, retrying");
                    tokio::time::sleep(Duration::from_millis(config.retry_interval_ms)).await;
                    continue;
                }
                Err(e) => break Err(e),
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome_label = match &result {
            Ok(_) => "success",
            Err(_) => "failed",
        };
        crate::core::metrics::PrometheusMeter
            .incr_counter("alerts_sent_total", &[("channel_name", &log.channel_name), ("outcome", outcome_label)]);

        match result {
            Ok(body) => {
                log.send_result = Some(body);
                log.error = None;
                self.transition_and_persist(&mut log, AlertSendStatus::Success, None).await?;
                self.record_stats(&log.channel_name, true, elapsed_ms).await;
            }
            Err(e) => {
                let truncated = truncate(&e, MAX_ERROR_LEN);
                log.error = Some(truncated.clone());
                self.transition_and_persist(&mut log, AlertSendStatus::Failed, Some(truncated)).await?;
                self.record_stats(&log.channel_name, false, elapsed_ms).await;
            }
        }
        Ok(())
    }

    async fn transition_and_persist(
        &self,
        log: &mut AlertLog,
        next: AlertSendStatus,
        error: Option<String>,
    ) -> Result<(), crate::core::GatewayError> {
        log.send_status = next;
        log.send_time = Some(crate::eventbus::now_millis());
        if error.is_some() {
            log.error = error;
        }
        self.persist(log).await
    }

    async fn persist(&self, log: &AlertLog) -> Result<(), crate::core::GatewayError> {
        self.store
            .update(TABLE_LOG, &self.tenant_id, &log.alert_log_id, log)
            .await
            .map_err(Into::into)
    }

    /// Updates the channel's rolling delivery stats with an exponential
    /// moving average for duration, matching the teacher's EMA-smoothed
    /// latency tracking rather than a plain running mean that never decays.
    ///
    /// Re-reads the channel config from the store inside a transactional
    /// scope rather than mutating the possibly-stale config `send_one`
    /// loaded earlier, so two sends landing on the same channel concurrently
    /// (e.g. from different gateway instances) can't clobber each other's
    /// counters with a stale read-modify-write (spec.md section 5).
    async fn record_stats(&self, channel_name: &str, success: bool, elapsed_ms: f64) {
        let store = self.store.clone();
        let tenant_id = self.tenant_id.clone();
        let channel_name_owned = channel_name.to_string();
        let result = self
            .store
            .in_tx(Box::new(move || {
                Box::pin(async move {
                    let mut current: AlertConfig =
                        store.query_one(TABLE_CONFIG, &tenant_id, &channel_name_owned).await?;
                    let now = crate::eventbus::now_millis();
                    current.last_send_time = Some(now);
                    if success {
                        current.total_sent += 1;
                        current.last_success_time = Some(now);
                    } else {
                        current.total_failed += 1;
                        current.last_failure_time = Some(now);
                    }
                    current.avg_duration_millis = if current.avg_duration_millis == 0.0 {
                        elapsed_ms
                    } else {
                        DURATION_EMA_ALPHA * elapsed_ms + (1.0 - DURATION_EMA_ALPHA) * current.avg_duration_millis
                    };
                    store.update(TABLE_CONFIG, &tenant_id, &channel_name_owned, &current).await
                })
            }))
            .await;
        if let Err(e) = result {
            warn!(channel = %channel_name, error = %e, "failed to persist alert channel stats");
        }
    }

    fn limiter_for(&self, config: &AlertConfig) -> Arc<TokenBucket> {
        self.limiters
            .entry(config.channel_name.clone())
            .or_insert_with(|| Arc::new(TokenBucket::new(config.rate_limit_per_minute.max(1), Duration::from_secs(60))))
            .clone()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditFields;
    use crate::store::MemoryStore;

    fn config(name: &str, rate_limit: u32) -> AlertConfig {
        AlertConfig {
            channel_name: name.to_string(),
            channel_type: crate::model::AlertChannelType::Webhook,
            server_config: serde_json::json!({ "url": "https://example.com/hook" }),
            max_retry_count: 0,
            retry_interval_ms: 1,
            rate_limit_per_minute: rate_limit,
            enabled: true,
            total_sent: 0,
            total_failed: 0,
            last_send_time: None,
            last_success_time: None,
            last_failure_time: None,
            avg_duration_millis: 0.0,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    fn log(id: &str, channel: &str, add_time: i64) -> AlertLog {
        AlertLog {
            alert_log_id: id.to_string(),
            channel_name: channel.to_string(),
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
            add_time,
        }
    }

    #[tokio::test]
    async fn missing_channel_config_marks_log_failed() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store.insert(TABLE_LOG, "t1", "a1", &log("a1", "ghost", 1)).await.unwrap();

        let worker = SendWorker::new(
            store.clone(),
            Arc::new(ChannelManager::new()),
            "t1",
            Duration::from_secs(5),
            10,
            Duration::from_secs(1),
        );
        worker.poll_once().await.unwrap();

        let stored: AlertLog = store.query_one(TABLE_LOG, "t1", "a1").await.unwrap();
        assert_eq!(stored.send_status, AlertSendStatus::Failed);
    }

    #[tokio::test]
    async fn rate_limited_channel_leaves_log_pending() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let cfg = config("ops", 1);
        store.insert(TABLE_CONFIG, "t1", "ops", &cfg).await.unwrap();
        store.insert(TABLE_LOG, "t1", "a1", &log("a1", "ops", 1)).await.unwrap();
        store.insert(TABLE_LOG, "t1", "a2", &log("a2", "ops", 2)).await.unwrap();

        let channels = Arc::new(ChannelManager::new());
        channels.upsert(&cfg);
        let worker = SendWorker::new(store.clone(), channels, "t1", Duration::from_secs(5), 10, Duration::from_secs(1));

        worker.poll_once().await.unwrap();
        // The webhook send itself will fail (no real server), but the
        // second log should never even attempt — the limiter only allows 1.
        let second: AlertLog = store.query_one(TABLE_LOG, "t1", "a2").await.unwrap();
        assert_eq!(second.send_status, AlertSendStatus::Pending);
    }
}
