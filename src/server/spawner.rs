// src/server/spawner.rs

//! Spawns the ingress listener's own background tasks (the Prometheus
//! metrics server and the config-reload log-level watcher) against the
//! shared runtime shutdown signal.

use super::initialization::ServerContext;
use super::metrics_server;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

pub async fn spawn_all(ctx: &mut ServerContext) {
    if ctx.runtime.config.metrics.enabled {
        let shutdown_rx = ctx.runtime.subscribe_shutdown();
        let handle = tokio::spawn(metrics_server::run_metrics_server(ctx.runtime.config.metrics.port, shutdown_rx));
        ctx.runtime.spawn_background(handle);
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    let shutdown_rx = ctx.runtime.subscribe_shutdown();
    let handle = tokio::spawn(watch_log_level(
        ctx.app_state.config_rx.clone(),
        ctx.app_state.log_reload_handle.clone(),
        shutdown_rx,
    ));
    ctx.runtime.spawn_background(handle);
}

/// Applies a reloaded config's log level to the global filter without a
/// restart, so a SIGHUP that changes `log_level` takes effect immediately.
async fn watch_log_level(
    mut config_rx: tokio::sync::watch::Receiver<crate::config::GatewayConfig>,
    log_reload_handle: std::sync::Arc<tracing_subscriber::reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            changed = config_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let log_level = config_rx.borrow().log_level.clone();
                if let Err(e) = log_reload_handle.reload(EnvFilter::new(&log_level)) {
                    warn!("failed to apply reloaded log level '{log_level}': {e}");
                } else {
                    info!("log level reloaded to '{log_level}'");
                }
            }
        }
    }
}
