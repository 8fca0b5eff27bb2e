// src/server/handler.rs

//! The gateway's per-request entry point: build a `RequestContext` from the
//! inbound request, run it through the router and proxy engine, and record
//! the outcome on the access log (spec.md section 4.D / 4.E control flow:
//! "Listener -> Router.match -> FilterChain(pre) -> Proxy.forward(...) ->
//! FilterChain(post) -> Response -> LogPipeline.enqueue"). Dispatch between
//! the HTTP and websocket paths is driven by the `Upgrade` header alone,
//! since `RouteConfig` carries no separate proxy-type field to branch on.

use crate::core::{GatewayError, GatewayErrorCode};
use crate::model::access_log::AccessLog;
use crate::model::{RouteConfig, ServiceDefinition, ServiceInstance};
use crate::proxy::WsForwarder;
use crate::router::context::RequestContext;
use crate::server::context::AppState;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// How long an idle websocket connection may sit without a frame in either
/// direction before the relay closes it (spec.md section 4.E; same default
/// as `proxy/ws.rs`'s own tests use).
const WS_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn handle(State(state): State<AppState>, req: Request<Body>) -> Response {
    let (mut parts, body) = req.into_parts();
    let client_ip = match ConnectInfo::<SocketAddr>::from_request_parts(&mut parts, &state).await {
        Ok(ConnectInfo(addr)) => addr,
        Err(_) => SocketAddr::from(([0, 0, 0, 0], 0)),
    };

    if is_websocket_upgrade(&parts.headers) {
        let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(u) => u,
            Err(rejection) => return rejection.into_response(),
        };
        return handle_websocket(state, parts, client_ip, upgrade).await;
    }

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b.to_vec(),
        Err(e) => return GatewayError::InvalidRequest(e.to_string()).into_response(),
    };
    handle_http(state, parts, client_ip, body_bytes).await
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn build_context(parts: &Parts, client_ip: SocketAddr, body: Vec<u8>) -> RequestContext {
    let trace_id = parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut ctx = RequestContext::new(parts.method.as_str(), parts.uri.path(), client_ip.ip(), trace_id);
    ctx.query = parts.uri.query().map(str::to_string);
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            ctx.headers.insert(name.as_str().to_string(), v.to_string());
        }
    }
    ctx.body = body;
    ctx
}

async fn run_proxy(state: &AppState, ctx: &mut RequestContext) -> Result<Option<RouteConfig>, GatewayError> {
    let route = match state.router.route(ctx).await? {
        Some(route) => route,
        None => return Ok(None),
    };
    if ctx.is_terminated() {
        return Ok(Some(route));
    }

    let service = state.lookup_service(&route.service_ref).await?;
    state.proxy_engine.forward(ctx, &service, "http").await?;
    state.router.run_post_proxy(ctx, &route).await?;
    Ok(Some(route))
}

fn headers_wire_size(headers: &HashMap<String, String>) -> u64 {
    headers.iter().map(|(k, v)| (k.len() + v.len() + 2) as u64).sum()
}

async fn handle_http(state: AppState, parts: Parts, client_ip: SocketAddr, body: Vec<u8>) -> Response {
    let received_at = crate::eventbus::now_millis();
    let request_headers_size = headers_wire_size(&parts.headers.iter().filter_map(|(n, v)| v.to_str().ok().map(|v| (n.as_str().to_string(), v.to_string()))).collect());
    let request_body_size = body.len() as u64;
    let mut ctx = build_context(&parts, client_ip, body);

    let result = run_proxy(&state, &mut ctx).await;

    let (gateway_status, body_bytes, extra_headers, error_code, error_message) = match &result {
        Ok(_) => {
            let fr = ctx.response.clone();
            match fr {
                Some(fr) => (fr.status, fr.body, fr.headers, None, None),
                None => (GatewayErrorCode::InternalError.status_code(), Vec::new(), HashMap::new(), None, None),
            }
        }
        Err(e) => {
            let code = e.code();
            let payload = serde_json::json!({"error": code.as_str(), "message": e.to_string()});
            let bytes = serde_json::to_vec(&payload).unwrap_or_default();
            let mut headers = HashMap::new();
            headers.insert("content-type".to_string(), "application/json".to_string());
            (code.status_code(), bytes, headers, Some(code.as_str().to_string()), Some(e.to_string()))
        }
    };

    let response_body_size = body_bytes.len() as u64;
    let response_headers_size = headers_wire_size(&extra_headers);
    let finished_at = crate::eventbus::now_millis();

    state.access_log.enqueue(AccessLog {
        access_log_id: Uuid::new_v4().to_string(),
        tenant_id: state.tenant_id.clone(),
        gateway_instance_id: state.node_id.clone(),
        route_id: ctx.route_id.clone(),
        service_id: ctx.service_id.clone(),
        upstream_instance_id: None,
        trace_id: ctx.trace_id.clone(),
        client_ip: client_ip.ip().to_string(),
        method: ctx.method.clone(),
        path: ctx.path.clone(),
        query: ctx.query.clone(),
        protocol: "HTTP/1.1".to_string(),
        request_headers_size,
        request_body_size,
        response_headers_size,
        response_body_size,
        upstream_status: if result.is_ok() { Some(gateway_status) } else { None },
        gateway_status,
        error_code,
        error_message,
        matched_filter_ids: ctx.matched_filter_ids.clone(),
        retry_count: ctx.retry_count,
        received_at,
        proxy_start_at: Some(received_at),
        backend_start_at: None,
        backend_recv_at: None,
        response_sent_at: Some(finished_at),
        finished_at,
        add_time: finished_at,
    });

    let mut builder = Response::builder().status(gateway_status);
    for (k, v) in &extra_headers {
        builder = builder.header(k, v);
    }
    builder.body(Body::from(body_bytes)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn handle_websocket(state: AppState, parts: Parts, client_ip: SocketAddr, upgrade: WebSocketUpgrade) -> Response {
    let received_at = crate::eventbus::now_millis();
    let mut ctx = build_context(&parts, client_ip, Vec::new());

    let (route, service, instance) = match resolve_websocket_target(&state, &mut ctx).await {
        Ok(target) => target,
        Err(e) => return log_pre_upgrade_failure(&state, &ctx, client_ip, received_at, e),
    };
    let (Some(route), Some(service), Some(instance)) = (route, service, instance) else {
        return log_pre_upgrade_short_circuit(&state, &ctx, client_ip, received_at);
    };

    let upstream_url = format!("ws://{}:{}{}", instance.host, instance.port, ctx.path);
    let proxy_engine = state.proxy_engine.clone();
    let access_log = state.access_log.clone();
    let tenant_id = state.tenant_id.clone();
    let node_id = state.node_id.clone();
    let service_id = service.service_id.clone();
    let instance_id = instance.instance_id.clone();
    let route_id = route.route_id.clone();
    let trace_id = ctx.trace_id.clone();
    let method = ctx.method.clone();
    let path = ctx.path.clone();
    let query = ctx.query.clone();
    let client_ip_str = client_ip.ip().to_string();

    upgrade.on_upgrade(move |socket| async move {
        let outcome = WsForwarder::new(WS_IDLE_TIMEOUT).relay(socket, &upstream_url).await;
        let success = outcome.is_ok();
        proxy_engine.record_outcome(&service_id, &instance_id, success);

        let finished_at = crate::eventbus::now_millis();
        access_log.enqueue(AccessLog {
            access_log_id: Uuid::new_v4().to_string(),
            tenant_id,
            gateway_instance_id: node_id,
            route_id: Some(route_id),
            service_id: Some(service_id),
            upstream_instance_id: Some(instance_id),
            trace_id,
            client_ip: client_ip_str,
            method,
            path,
            query,
            protocol: "websocket".to_string(),
            request_headers_size: 0,
            request_body_size: 0,
            response_headers_size: 0,
            response_body_size: 0,
            upstream_status: None,
            gateway_status: if success { 101 } else { GatewayErrorCode::UpstreamError.status_code() },
            error_code: outcome.as_ref().err().map(|e| e.code().as_str().to_string()),
            error_message: outcome.as_ref().err().map(|e| e.to_string()),
            matched_filter_ids: vec![],
            retry_count: 0,
            received_at,
            proxy_start_at: Some(received_at),
            backend_start_at: Some(received_at),
            backend_recv_at: Some(finished_at),
            response_sent_at: Some(finished_at),
            finished_at,
            add_time: finished_at,
        });
    })
}

type WebsocketTarget = (Option<RouteConfig>, Option<ServiceDefinition>, Option<ServiceInstance>);

async fn resolve_websocket_target(state: &AppState, ctx: &mut RequestContext) -> Result<WebsocketTarget, GatewayError> {
    let Some(route) = state.router.route(ctx).await? else {
        return Ok((None, None, None));
    };
    if ctx.is_terminated() {
        return Ok((Some(route), None, None));
    }
    let service = state.lookup_service(&route.service_ref).await?;
    let instance = state.proxy_engine.select_instance(ctx, &service).await?;
    Ok((Some(route), Some(service), Some(instance)))
}

fn log_pre_upgrade_short_circuit(state: &AppState, ctx: &RequestContext, client_ip: SocketAddr, received_at: i64) -> Response {
    let fr = ctx.response.clone();
    let status = fr.as_ref().map(|r| r.status).unwrap_or(GatewayErrorCode::RouteNotFound.status_code());
    log_pre_upgrade(state, ctx, client_ip, received_at, status, None, None);
    fr.map(|r| {
        let mut builder = Response::builder().status(r.status);
        for (k, v) in &r.headers {
            builder = builder.header(k, v);
        }
        builder.body(Body::from(r.body)).unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    })
    .unwrap_or_else(|| StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND).into_response())
}

fn log_pre_upgrade_failure(state: &AppState, ctx: &RequestContext, client_ip: SocketAddr, received_at: i64, err: GatewayError) -> Response {
    let code = err.code();
    log_pre_upgrade(state, ctx, client_ip, received_at, code.status_code(), Some(code.as_str().to_string()), Some(err.to_string()));
    err.into_response()
}

fn log_pre_upgrade(
    state: &AppState,
    ctx: &RequestContext,
    client_ip: SocketAddr,
    received_at: i64,
    gateway_status: u16,
    error_code: Option<String>,
    error_message: Option<String>,
) {
    let finished_at = crate::eventbus::now_millis();
    state.access_log.enqueue(AccessLog {
        access_log_id: Uuid::new_v4().to_string(),
        tenant_id: state.tenant_id.clone(),
        gateway_instance_id: state.node_id.clone(),
        route_id: ctx.route_id.clone(),
        service_id: ctx.service_id.clone(),
        upstream_instance_id: None,
        trace_id: ctx.trace_id.clone(),
        client_ip: client_ip.ip().to_string(),
        method: ctx.method.clone(),
        path: ctx.path.clone(),
        query: ctx.query.clone(),
        protocol: "websocket".to_string(),
        request_headers_size: 0,
        request_body_size: 0,
        response_headers_size: 0,
        response_body_size: 0,
        upstream_status: None,
        gateway_status,
        error_code,
        error_message,
        matched_filter_ids: ctx.matched_filter_ids.clone(),
        retry_count: ctx.retry_count,
        received_at,
        proxy_start_at: Some(received_at),
        backend_start_at: None,
        backend_recv_at: None,
        response_sent_at: Some(finished_at),
        finished_at,
        add_time: finished_at,
    });
}

/// Converts an error directly into an HTTP response for entry points that
/// fail before a `RequestContext` can even be built (malformed body), and
/// for the pre-upgrade websocket failure path.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = StatusCode::from_u16(code.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let payload = serde_json::json!({"error": code.as_str(), "message": self.to_string()});
        (status, axum::Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_upgrade(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::UPGRADE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn recognizes_websocket_upgrade_header_case_insensitively() {
        assert!(is_websocket_upgrade(&headers_with_upgrade("websocket")));
        assert!(is_websocket_upgrade(&headers_with_upgrade("WebSocket")));
        assert!(!is_websocket_upgrade(&headers_with_upgrade("h2c")));
        assert!(!is_websocket_upgrade(&HeaderMap::new()));
    }

    #[test]
    fn headers_wire_size_sums_name_value_and_separator() {
        let mut headers = HashMap::new();
        headers.insert("host".to_string(), "example.com".to_string());
        // "host" (4) + "example.com" (11) + 2 for ": " = 17
        assert_eq!(headers_wire_size(&headers), 17);
        assert_eq!(headers_wire_size(&HashMap::new()), 0);
    }

    #[tokio::test]
    async fn gateway_error_into_response_uses_error_code_status() {
        let err = GatewayError::ServiceUnavailable("svc-missing".to_string());
        let status = err.code().status_code();
        let response = err.into_response();
        assert_eq!(response.status().as_u16(), status);
    }

    #[test]
    fn build_context_captures_trace_id_query_and_headers() {
        let client_ip: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let request = Request::builder()
            .method("GET")
            .uri("/api/widgets?limit=5")
            .header("x-request-id", "trace-123")
            .header("x-custom", "yes")
            .body(Body::empty())
            .unwrap();
        let (parts, _body) = request.into_parts();

        let ctx = build_context(&parts, client_ip, b"payload".to_vec());

        assert_eq!(ctx.trace_id, "trace-123");
        assert_eq!(ctx.path, "/api/widgets");
        assert_eq!(ctx.query.as_deref(), Some("limit=5"));
        assert_eq!(ctx.headers.get("x-custom").map(String::as_str), Some("yes"));
        assert_eq!(ctx.body, b"payload".to_vec());
    }

    #[test]
    fn build_context_generates_trace_id_when_header_absent() {
        let client_ip: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let request = Request::builder().method("GET").uri("/").body(Body::empty()).unwrap();
        let (parts, _body) = request.into_parts();

        let ctx = build_context(&parts, client_ip, Vec::new());
        assert!(Uuid::parse_str(&ctx.trace_id).is_ok());
    }
}
