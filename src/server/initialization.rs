// src/server/initialization.rs

//! Handles the complete server initialization process: bootstrapping every
//! gateway component via [`Supervisor::bootstrap`] and, if TLS is
//! configured, loading the certificate/key pair into an `axum-server`
//! `RustlsConfig`.

use super::context::AppState;
use crate::config::GatewayConfig;
use crate::supervisor::{GatewayRuntime, Supervisor};
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Everything [`super::spawner::spawn_all`] and [`super::connection_loop::run`]
/// need: the bootstrapped runtime, the cloneable request-handler state, and
/// an optional TLS config for the ingress listener.
pub struct ServerContext {
    pub runtime: GatewayRuntime,
    pub app_state: AppState,
    pub tls: Option<RustlsConfig>,
}

pub async fn setup(
    config: GatewayConfig,
    config_path: Option<String>,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    info!(node_id = %config.node_id, tenant_id = %config.tenant_id, "starting gateway");

    let tls = if config.listener.tls_enabled {
        let cert = config
            .listener
            .tls_cert_path
            .as_deref()
            .context("listener.tls_enabled is true but tls_cert_path is unset")?;
        let key = config
            .listener
            .tls_key_path
            .as_deref()
            .context("listener.tls_enabled is true but tls_key_path is unset")?;
        info!(cert, key, "TLS enabled for ingress listener");
        Some(
            RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| format!("failed to load TLS cert/key from '{cert}' / '{key}'"))?,
        )
    } else {
        None
    };

    let runtime = Supervisor::bootstrap(config, config_path)
        .await
        .map_err(|e| anyhow::anyhow!("supervisor bootstrap failed: {e}"))?;
    let app_state = AppState::from_runtime(&runtime, log_reload_handle);

    Ok(ServerContext { runtime, app_state, tls })
}
