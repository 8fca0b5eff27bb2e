// src/proxy/http.rs

//! The `http` proxy type: forwards method/headers/body to the upstream and
//! streams the response back (spec.md section 4.E).

use crate::router::context::{FilterResponse, RequestContext};
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

/// Hop-by-hop headers stripped before forwarding in either direction
/// (spec.md section 4.E). `Upgrade` is kept when the request is a
/// WebSocket upgrade, handled separately by [`crate::proxy::ws`].
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "te",
    "transfer-encoding",
    "trailer",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str()) || lower.starts_with("proxy-")
}

pub struct HttpForwarder {
    client: Client,
}

impl HttpForwarder {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self { client }
    }

    /// Forwards `ctx` to `upstream_base` (e.g. `http://10.0.0.1:8080`) and
    /// writes the upstream response into `ctx.response`. Returns the
    /// upstream HTTP status so the caller can classify transience for
    /// retry purposes.
    pub async fn forward(&self, ctx: &mut RequestContext, upstream_base: &str) -> Result<u16, reqwest::Error> {
        let mut url = format!("{}{}", upstream_base.trim_end_matches('/'), ctx.path);
        if let Some(query) = &ctx.query {
            url.push('?');
            url.push_str(query);
        }

        let method = reqwest::Method::from_bytes(ctx.method.as_bytes()).unwrap_or(reqwest::Method::GET);
        let mut builder = self.client.request(method, &url);

        for (name, value) in &ctx.headers {
            if is_hop_by_hop(name) {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder = builder
            .header("x-forwarded-for", ctx.client_ip.to_string())
            .header("x-forwarded-proto", "http")
            .header("x-request-id", Uuid::new_v4().to_string());

        if !ctx.body.is_empty() {
            builder = builder.body(ctx.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let mut headers = std::collections::HashMap::new();
        for (name, value) in response.headers() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        if is_sse {
            headers.insert("x-meshgate-sse".to_string(), "1".to_string());
        }

        let body = response.bytes().await?.to_vec();
        ctx.response = Some(FilterResponse {
            status,
            headers,
            body,
        });
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_header_names() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("Proxy-Authenticate"));
        assert!(!is_hop_by_hop("content-type"));
    }
}
