// src/router/filters/header.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct HeaderFilterConfig {
    #[serde(default)]
    set: std::collections::HashMap<String, String>,
    #[serde(default)]
    remove: Vec<String>,
}

/// Adds/overwrites and removes request headers.
pub struct HeaderFilter;

#[async_trait]
impl Filter for HeaderFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        ctx.snapshot_if_absent(true);
        let cfg: HeaderFilterConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        for (k, v) in cfg.set {
            ctx.headers.insert(k, v);
        }
        for k in cfg.remove {
            ctx.headers.remove(&k);
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
    async fn sets_and_removes_headers() {
        let mut ctx = RequestContext::new("GET", "/x", Ipv4Addr::LOCALHOST.into(), "trace1");
        ctx.headers.insert("x-old".to_string(), "1".to_string());
        HeaderFilter
            .apply(&mut ctx, &json!({"set": {"x-new": "2"}, "remove": ["x-old"]}))
            .await;
        assert_eq!(ctx.headers.get("x-new"), Some(&"2".to_string()));
        assert!(!ctx.headers.contains_key("x-old"));
        assert!(ctx.snapshot.is_some());
    }
}
