// src/router/filters/rewrite.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::RwLock;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct RewriteFilterConfig {
    pattern: String,
    replacement: String,
}

static COMPILED: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(|| RwLock::new(HashMap::new()));

fn compiled(pattern: &str) -> Option<Regex> {
    if let Some(re) = COMPILED.read().unwrap().get(pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(pattern).ok()?;
    COMPILED.write().unwrap().insert(pattern.to_string(), re.clone());
    Some(re)
}

/// Rewrites the path via a cached regex substitution.
pub struct RewriteFilter;

#[async_trait]
impl Filter for RewriteFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let Ok(cfg) = serde_json::from_value::<RewriteFilterConfig>(config.clone()) else {
            return;
        };
        let Some(re) = compiled(&cfg.pattern) else {
            return;
        };
        let rewritten = re.replace(&ctx.path, cfg.replacement.as_str()).into_owned();
        if rewritten != ctx.path {
            ctx.snapshot_if_absent(false);
            ctx.path = rewritten;
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
    async fn rewrites_path_via_regex() {
        let mut ctx = RequestContext::new("GET", "/legacy/123", Ipv4Addr::LOCALHOST.into(), "t1");
        RewriteFilter
            .apply(&mut ctx, &json!({"pattern": "^/legacy/(\\d+)$", "replacement": "/v2/items/$1"}))
            .await;
        assert_eq!(ctx.path, "/v2/items/123");
    }
}
