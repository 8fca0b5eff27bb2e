// src/router/filters/method.rs

use crate::router::context::{FilterResponse, RequestContext};
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MethodFilterConfig {
    /// Rewrites the method, or rejects the request if `allow` is set and
    /// the current method isn't in it.
    #[serde(default)]
    rewrite_to: Option<String>,
    #[serde(default)]
    allow: Vec<String>,
}

/// Rewrites or allow-lists the HTTP method.
pub struct MethodFilter;

#[async_trait]
impl Filter for MethodFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let Ok(cfg) = serde_json::from_value::<MethodFilterConfig>(config.clone()) else {
            return;
        };
        if !cfg.allow.is_empty() && !cfg.allow.iter().any(|m| m.eq_ignore_ascii_case(&ctx.method)) {
            ctx.response = Some(FilterResponse::new(405, b"method not allowed".to_vec()));
            return;
        }
        if let Some(rewrite_to) = cfg.rewrite_to {
            ctx.snapshot_if_absent(false);
            ctx.method = rewrite_to;
        }
    }

    fn is_mutating(&self) -> bool {
        true
    }
}
