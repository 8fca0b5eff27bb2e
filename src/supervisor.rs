// src/supervisor.rs

//! Builds every component in dependency order, holds them in one
//! `GatewayRuntime`, and drains them in reverse on shutdown (spec.md
//! section 4.I). Grounded on `server/mod.rs::run` + `server/spawner.rs`'s
//! ordered setup -> spawn-all -> main loop -> ordered shutdown, and
//! `server/connection_loop.rs`'s shutdown sequence and platform-conditional
//! signal handling.

use crate::alert::{AlertDispatcher, AlertDispatcherConfig, ChannelManager};
use crate::config::GatewayConfig;
use crate::core::GatewayError;
use crate::eventbus::{EventBus, EventCompactor, EventHandler, EventPoller, HandlerRegistry};
use crate::logpipeline::{bounded_channel as log_bounded_channel, AccessLogSender, LogWriterTask, RetentionGcTask};
use crate::model::alert::{AlertConfig, TABLE_CONFIG};
use crate::model::route::{RouteConfig, TABLE as TABLE_ROUTE};
use crate::model::tunnel::{TunnelStaticNode, TunnelStaticServer, TABLE_NODE, TABLE_SERVER};
use crate::proxy::breaker::{BreakerConfig, CircuitBreakerRegistry};
use crate::proxy::{HttpForwarder, LoadBalancer, ProxyEngine, RetryPolicy};
use crate::registry::ServiceRegistry;
use crate::router::{filter::FilterRegistry, Router};
use crate::store::{MemoryStore, PageRequest, Store, StoreExt};
use crate::tunnel::{default_forwarders, HealthCheckWorker, TunnelServerTask};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How stale a service instance's heartbeat may be, relative to its
/// registry-assumed send interval, before `ServiceRegistry` treats it as
/// unhealthy on read (spec.md section 4.C; three missed heartbeats).
const SERVICE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Every long-lived component the gateway owns for the lifetime of the
/// process. Built once by [`Supervisor::bootstrap`] and torn down by
/// [`Supervisor::shutdown`].
pub struct GatewayRuntime {
    pub config: GatewayConfig,
    pub store: Arc<dyn Store>,
    pub event_bus: EventBus,
    pub registry: ServiceRegistry,
    pub router: Arc<Router>,
    pub proxy_engine: Arc<ProxyEngine>,
    pub access_log: AccessLogSender,
    pub alert_dispatcher: Arc<AlertDispatcher>,
    pub tunnel_servers: Vec<Arc<TunnelServerTask>>,
    /// Fed a freshly re-read config on SIGHUP; `server::run` watches this to
    /// apply what can change without a restart (currently: log level).
    pub config_rx: watch::Receiver<GatewayConfig>,
    shutdown_tx: broadcast::Sender<()>,
    background: Vec<JoinHandle<()>>,
}

impl GatewayRuntime {
    /// A fresh subscription to the shutdown broadcast, for listeners
    /// bootstrapped outside `Supervisor` (the gateway's own HTTP listener).
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Hands the runtime a task to drain on shutdown, same as the ones
    /// `Supervisor::bootstrap` spawns internally.
    pub fn spawn_background(&mut self, handle: JoinHandle<()>) {
        self.background.push(handle);
    }

    /// Broadcasts the shutdown signal, drops the pieces that hold senders
    /// feeding background workers (closing their channels), then waits on
    /// every spawned task up to `shutdown_grace_secs`. Mirrors
    /// `server/connection_loop.rs`'s drain order: stop accepting new work,
    /// flush what's buffered, wait on critical tasks, bound the rest.
    pub async fn shutdown(mut self) {
        info!("gateway runtime shutting down");
        let _ = self.shutdown_tx.send(());
        drop(self.alert_dispatcher);

        let grace = Duration::from_secs(self.config.supervisor.shutdown_grace_secs);
        for handle in self.background.drain(..) {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("background task panicked during shutdown: {e:?}"),
                Err(_) => warn!("background task did not finish within the shutdown grace window"),
            }
        }
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Builds the full runtime in dependency order: store, event bus and
    /// its reload handlers, service registry, router, proxy engine,
    /// access-log pipeline, alert dispatcher, tunnel engine. Every
    /// background worker is spawned against the same `shutdown_tx` so one
    /// broadcast ends them all.
    pub async fn bootstrap(config: GatewayConfig, config_path: Option<String>) -> Result<GatewayRuntime, GatewayError> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut background = Vec::new();
        let (config_tx, config_rx) = watch::channel(config.clone());
        if let Some(path) = config_path {
            background.push(tokio::spawn(watch_config_reload(path, config_tx, shutdown_tx.subscribe())));
        }

        // spec.md section 4.A: the reference Store is in-memory; a durable
        // backend is a pluggable collaborator selected at deployment time.
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

        let event_bus = EventBus::new(store.clone(), config.tenant_id.clone(), config.node_id.clone());
        let handlers = HandlerRegistry::new();

        let registry = ServiceRegistry::new(store.clone(), event_bus.clone(), config.tenant_id.clone(), SERVICE_HEARTBEAT_INTERVAL);
        handlers.register(
            "service_changed",
            Arc::new(ServiceRefreshHandler {
                registry: registry.clone(),
            }),
        );

        let routes = load_routes(&store, &config.tenant_id).await?;
        let router = Arc::new(Router::new(routes, vec![], FilterRegistry::with_builtins(), config.router.max_filter_chain_depth as u32));
        handlers.register(
            "route_changed",
            Arc::new(RouteReloadHandler {
                router: router.clone(),
                store: store.clone(),
                tenant_id: config.tenant_id.clone(),
            }),
        );

        let breaker = Arc::new(CircuitBreakerRegistry::new(BreakerConfig::default()));
        let http = HttpForwarder::new(
            Duration::from_millis(config.timeouts.connect_timeout_ms),
            Duration::from_millis(config.timeouts.request_timeout_ms),
        );
        let retry = RetryPolicy::new(
            config.retry.retry_count + 1,
            Duration::from_millis(config.retry.retry_interval_ms),
            Duration::from_millis(config.retry.retry_max_delay_ms),
        );
        let proxy_engine = Arc::new(ProxyEngine::new(registry.clone(), LoadBalancer::new(), breaker, http, retry));

        let (access_log, log_rx) = log_bounded_channel(config.log_pipeline.channel_capacity);
        let log_writer = LogWriterTask::new(
            store.clone(),
            config.tenant_id.clone(),
            log_rx,
            config.log_pipeline.batch_size,
            Duration::from_millis(config.log_pipeline.flush_interval_ms),
        );
        background.push(tokio::spawn(log_writer.run(shutdown_tx.subscribe())));
        let log_gc = RetentionGcTask::new(
            store.clone(),
            config.tenant_id.clone(),
            Duration::from_millis(config.log_pipeline.cleanup_interval_ms),
            Duration::from_secs(config.log_pipeline.retention_hours * 3600),
        );
        background.push(tokio::spawn(log_gc.run(shutdown_tx.subscribe())));

        let channels = Arc::new(ChannelManager::from_configs(&load_alert_configs(&store, &config.tenant_id).await?));
        handlers.register(
            "alert_config_changed",
            Arc::new(AlertChannelReloadHandler {
                channels: channels.clone(),
                store: store.clone(),
                tenant_id: config.tenant_id.clone(),
            }),
        );
        let alert_dispatcher = Arc::new(AlertDispatcher::spawn(
            store.clone(),
            channels,
            AlertDispatcherConfig {
                tenant_id: config.tenant_id.clone(),
                ingest_buffer: config.alert.batch_size.max(1) * 20,
                ingest_batch_size: config.alert.batch_size,
                ingest_flush_interval: Duration::from_millis(config.alert.flush_interval_ms),
                send_poll_interval: Duration::from_millis(config.alert.poll_interval_ms),
                send_batch_size: config.alert.batch_size,
                send_timeout: Duration::from_millis(config.timeouts.request_timeout_ms),
                cleanup_interval: Duration::from_millis(config.alert.cleanup_interval_ms),
                retention: Duration::from_secs(config.alert.retention_hours * 3600),
            },
            &shutdown_tx,
        ));

        let tunnel_servers = bootstrap_tunnels(&store, &config, &shutdown_tx, &mut background).await?;

        // The poller must see every handler registered above before its
        // first tick, so it's spawned last among the event-bus workers.
        let poller = Arc::new(EventPoller::new(
            store.clone(),
            handlers,
            config.tenant_id.clone(),
            config.node_id.clone(),
            Duration::from_millis(config.event_bus.poll_interval_ms),
            config.event_bus.batch,
            Duration::from_secs(config.event_bus.replay_window_hours * 3600),
        ));
        background.push(tokio::spawn(poller.run(shutdown_tx.subscribe())));
        let compactor = Arc::new(EventCompactor::new(
            store.clone(),
            config.tenant_id.clone(),
            Duration::from_millis(config.event_bus.poll_interval_ms * 10),
            Duration::from_secs(config.event_bus.retention_hours * 3600),
        ));
        background.push(tokio::spawn(compactor.run(shutdown_tx.subscribe())));

        Ok(GatewayRuntime {
            config,
            store,
            event_bus,
            registry,
            router,
            proxy_engine,
            access_log,
            alert_dispatcher,
            tunnel_servers,
            config_rx,
            shutdown_tx,
            background,
        })
    }

    /// Blocks until SIGINT/SIGTERM (Ctrl-C on Windows), then drains the
    /// runtime. Same platform-conditional shape as
    /// `server/connection_loop.rs`'s `await_shutdown_signal`.
    pub async fn run(config: GatewayConfig, config_path: Option<String>) -> Result<(), GatewayError> {
        let runtime = Self::bootstrap(config, config_path).await?;
        await_shutdown_signal().await;
        runtime.shutdown().await;
        Ok(())
    }
}

/// Watches for SIGHUP and re-reads `path`, pushing a freshly validated
/// config into `config_tx` so subscribers (currently: the log-level
/// reload handle wired up in `main`) can pick up the change without a
/// restart. No-op on non-unix platforms; SIGHUP has no analogue there.
#[cfg(unix)]
async fn watch_config_reload(path: String, config_tx: watch::Sender<GatewayConfig>, mut shutdown_rx: broadcast::Receiver<()>) {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGHUP handler: {e}");
            return;
        }
    };
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            _ = sighup.recv() => {
                match GatewayConfig::from_file(&path) {
                    Ok(reloaded) => {
                        info!("config reloaded from {path} on SIGHUP");
                        let _ = config_tx.send(reloaded);
                    }
                    Err(e) => warn!("SIGHUP config reload from {path} failed, keeping current config: {e}"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn watch_config_reload(_path: String, _config_tx: watch::Sender<GatewayConfig>, mut shutdown_rx: broadcast::Receiver<()>) {
    let _ = shutdown_rx.recv().await;
}

#[cfg(unix)]
async fn await_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, shutting down"),
        _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
    }
}

#[cfg(not(unix))]
async fn await_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, shutting down");
}

async fn load_routes(store: &Arc<dyn Store>, tenant_id: &str) -> Result<Vec<RouteConfig>, GatewayError> {
    let page: crate::store::PageResult<RouteConfig> = store
        .query(TABLE_ROUTE, tenant_id, "enabled", PageRequest::new(0, usize::MAX / 2))
        .await?;
    Ok(page.items.into_iter().filter(|r| r.enabled).collect())
}

async fn load_alert_configs(store: &Arc<dyn Store>, tenant_id: &str) -> Result<Vec<AlertConfig>, GatewayError> {
    let page: crate::store::PageResult<AlertConfig> = store
        .query(TABLE_CONFIG, tenant_id, "enabled", PageRequest::new(0, usize::MAX / 2))
        .await?;
    Ok(page.items.into_iter().filter(|c| c.enabled).collect())
}

async fn bootstrap_tunnels(
    store: &Arc<dyn Store>,
    config: &GatewayConfig,
    shutdown_tx: &broadcast::Sender<()>,
    background: &mut Vec<JoinHandle<()>>,
) -> Result<Vec<Arc<TunnelServerTask>>, GatewayError> {
    let servers: crate::store::PageResult<TunnelStaticServer> = store
        .query(TABLE_SERVER, &config.tenant_id, "enabled", PageRequest::new(0, usize::MAX / 2))
        .await?;
    let (tcp, udp) = default_forwarders(
        Duration::from_millis(config.timeouts.connect_timeout_ms),
        64 * 1024,
        Duration::from_millis(config.timeouts.idle_timeout_ms),
    );

    let mut tasks = Vec::new();
    for server in servers.items.into_iter().filter(|s| s.enabled) {
        let nodes: crate::store::PageResult<TunnelStaticNode> = store
            .query(TABLE_NODE, &config.tenant_id, &server.server_id, PageRequest::new(0, usize::MAX / 2))
            .await?;
        for node in nodes.items.into_iter().filter(|n| n.server_id == server.server_id) {
            let worker = HealthCheckWorker::new(store.clone(), config.tenant_id.clone(), node.node_id.clone(), server.health_check.clone());
            background.push(tokio::spawn(worker.run(shutdown_tx.subscribe())));
        }

        let task = Arc::new(TunnelServerTask::new(server, store.clone(), config.tenant_id.clone(), tcp.clone(), udp.clone()));
        background.push(tokio::spawn(task.clone().run(shutdown_tx.subscribe())));
        tasks.push(task);
    }
    Ok(tasks)
}

/// Reloads the live route table on `RouteChanged` (spec.md section 4.B
/// step 4 / section 4.D hot-swap requirement).
struct RouteReloadHandler {
    router: Arc<Router>,
    store: Arc<dyn Store>,
    tenant_id: String,
}

#[async_trait]
impl EventHandler for RouteReloadHandler {
    async fn handle(&self, _payload: &Value) -> Result<(), String> {
        let routes = load_routes(&self.store, &self.tenant_id)
            .await
            .map_err(|e| e.to_string())?;
        self.router.reload_routes(routes).await;
        Ok(())
    }
}

/// Refreshes one service's cached instance set on `ServiceChanged`.
struct ServiceRefreshHandler {
    registry: ServiceRegistry,
}

#[async_trait]
impl EventHandler for ServiceRefreshHandler {
    async fn handle(&self, payload: &Value) -> Result<(), String> {
        let Some(service_id) = payload.get("serviceId").and_then(Value::as_str) else {
            return Err("service_changed event missing serviceId".to_string());
        };
        self.registry.refresh(service_id).await.map_err(|e| e.to_string())
    }
}

/// Hot-swaps one channel adapter on `AlertConfigChanged`.
struct AlertChannelReloadHandler {
    channels: Arc<ChannelManager>,
    store: Arc<dyn Store>,
    tenant_id: String,
}

#[async_trait]
impl EventHandler for AlertChannelReloadHandler {
    async fn handle(&self, payload: &Value) -> Result<(), String> {
        let Some(channel_name) = payload.get("channelName").and_then(Value::as_str) else {
            return Err("alert_config_changed event missing channelName".to_string());
        };
        match self.store.query_one::<AlertConfig>(TABLE_CONFIG, &self.tenant_id, channel_name).await {
            Ok(config) => self.channels.upsert(&config),
            Err(crate::store::StoreError::NotFound) => self.channels.remove(channel_name),
            Err(e) => return Err(e.to_string()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_builds_runtime_and_shuts_down_cleanly() {
        let config = GatewayConfig::default();
        let runtime = Supervisor::bootstrap(config, None).await.expect("bootstrap should succeed with no configured data");
        assert!(runtime.tunnel_servers.is_empty());
        runtime.shutdown().await;
    }
}
