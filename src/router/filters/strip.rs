// src/router/filters/strip.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StripFilterConfig {
    prefix: String,
}

/// Strips a leading path prefix before the request reaches the upstream.
pub struct StripFilter;

#[async_trait]
impl Filter for StripFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let Ok(cfg) = serde_json::from_value::<StripFilterConfig>(config.clone()) else {
            return;
        };
        if let Some(stripped) = ctx.path.strip_prefix(&cfg.prefix) {
            ctx.snapshot_if_absent(false);
            ctx.path = if stripped.is_empty() {
                "/".to_string()
            } else if stripped.starts_with('/') {
                stripped.to_string()
            } else {
                format!("/{stripped}")
            };
        }
    }

    fn is_mutating(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn strips_matching_prefix() {
        let mut ctx = RequestContext::new("GET", "/api/v1/widgets", Ipv4Addr::LOCALHOST.into(), "t1");
        StripFilter.apply(&mut ctx, &json!({"prefix": "/api/v1"})).await;
        assert_eq!(ctx.path, "/widgets");
    }

    #[tokio::test]
    async fn leaves_non_matching_path_untouched() {
        let mut ctx = RequestContext::new("GET", "/other", Ipv4Addr::LOCALHOST.into(), "t1");
        StripFilter.apply(&mut ctx, &json!({"prefix": "/api/v1"})).await;
        assert_eq!(ctx.path, "/other");
    }
}
