// src/server/mod.rs

use crate::config::GatewayConfig;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, reload};

mod connection_loop;
pub mod context;
mod handler;
mod initialization;
mod metrics_server;
mod spawner;

/// The main server startup function, orchestrating all setup phases:
/// bootstrap every gateway component, spawn the listener's own background
/// tasks (the metrics server), then serve ingress traffic until shutdown.
pub async fn run(
    config: GatewayConfig,
    config_path: Option<String>,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    let mut server_context = initialization::setup(config, config_path, log_reload_handle).await?;
    spawner::spawn_all(&mut server_context).await;
    connection_loop::run(server_context).await;
    Ok(())
}
