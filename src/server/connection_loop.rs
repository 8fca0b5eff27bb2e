// src/server/connection_loop.rs

//! The ingress listener's main loop: bind (optionally over TLS), serve
//! until a shutdown signal arrives, then drain the whole runtime. Same
//! overall shape as the teacher's connection loop — await signal, stop
//! accepting, wait for in-flight work, then tear down background tasks —
//! but built on `axum-server` instead of a hand-rolled TCP accept loop,
//! since the ingress traffic here is HTTP/WS rather than a raw protocol.

use super::context::AppState;
use super::handler;
use super::initialization::ServerContext;
use axum::Router;
use axum_server::Handle;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{error, info};

pub async fn run(ctx: ServerContext) {
    let ServerContext { runtime, app_state, tls } = ctx;

    let ip: IpAddr = runtime.config.listener.host.parse().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let addr = SocketAddr::new(ip, runtime.config.listener.port);
    let grace = Duration::from_secs(runtime.config.supervisor.shutdown_grace_secs);

    let app = build_router(app_state);
    let handle = Handle::new();
    let serve_task = spawn_server(addr, app, tls, handle.clone());

    info!(%addr, "gateway ingress listener started");
    await_shutdown_signal().await;
    info!("shutdown signal received, draining ingress listener");

    handle.graceful_shutdown(Some(grace));
    let _ = serve_task.await;

    runtime.shutdown().await;
}

fn build_router(state: AppState) -> Router {
    Router::new().fallback(handler::handle).with_state(state)
}

fn spawn_server(addr: SocketAddr, app: Router, tls: Option<axum_server::tls_rustls::RustlsConfig>, handle: Handle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
        let result = match tls {
            Some(cfg) => axum_server::bind_rustls(addr, cfg).handle(handle).serve(make_service).await,
            None => axum_server::bind(addr).handle(handle).serve(make_service).await,
        };
        if let Err(e) = result {
            error!("ingress listener exited with error: {e}");
        }
    })
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
