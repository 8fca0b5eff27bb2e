// src/router/filters/cors.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CorsFilterConfig {
    #[serde(default = "default_origin")]
    allow_origin: String,
    #[serde(default = "default_methods")]
    allow_methods: String,
}

fn default_origin() -> String {
    "*".to_string()
}

fn default_methods() -> String {
    "GET, POST, PUT, DELETE, OPTIONS".to_string()
}

/// Stamps CORS response headers. Runs in `PostProxy` so it decorates
/// whatever response the proxy stage (or an earlier short-circuit)
/// produced.
pub struct CorsFilter;

#[async_trait]
impl Filter for CorsFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let cfg: CorsFilterConfig = serde_json::from_value(config.clone()).unwrap_or(CorsFilterConfig {
            allow_origin: default_origin(),
            allow_methods: default_methods(),
        });
        if let Some(response) = ctx.response.as_mut() {
            response
                .headers
                .insert("access-control-allow-origin".to_string(), cfg.allow_origin);
            response
                .headers
                .insert("access-control-allow-methods".to_string(), cfg.allow_methods);
        }
    }
}
