// src/server/context.rs

//! The shared, cloneable state handed to every axum request handler.
//! Grounded on `core/state/core.rs`'s `ServerState`: one struct wrapping
//! every component a request needs, built once and `.clone()`d per
//! connection rather than re-resolved.

use crate::config::GatewayConfig;
use crate::core::GatewayError;
use crate::logpipeline::AccessLogSender;
use crate::model::ServiceDefinition;
use crate::proxy::ProxyEngine;
use crate::router::Router;
use crate::store::{Store, StoreExt};
use crate::supervisor::GatewayRuntime;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Everything the per-request handler needs, cloned out of a bootstrapped
/// [`GatewayRuntime`]. Kept separate from `GatewayRuntime` itself so that
/// `GatewayRuntime::shutdown(self)` — which consumes the runtime by value —
/// can still run after the last clone of `AppState` is dropped.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub router: Arc<Router>,
    pub proxy_engine: Arc<ProxyEngine>,
    pub access_log: AccessLogSender,
    pub tenant_id: String,
    pub node_id: String,
    pub config_rx: watch::Receiver<GatewayConfig>,
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl AppState {
    pub fn from_runtime(runtime: &GatewayRuntime, log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>) -> Self {
        Self {
            store: runtime.store.clone(),
            router: runtime.router.clone(),
            proxy_engine: runtime.proxy_engine.clone(),
            access_log: runtime.access_log.clone(),
            tenant_id: runtime.config.tenant_id.clone(),
            node_id: runtime.config.node_id.clone(),
            config_rx: runtime.config_rx.clone(),
            log_reload_handle,
        }
    }

    pub async fn lookup_service(&self, service_id: &str) -> Result<ServiceDefinition, GatewayError> {
        self.store
            .query_one(crate::model::service::TABLE_SERVICE, &self.tenant_id, service_id)
            .await
    }
}
