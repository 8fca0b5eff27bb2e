// src/router/filters/query_param.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct QueryParamFilterConfig {
    #[serde(default)]
    set: std::collections::HashMap<String, String>,
    #[serde(default)]
    remove: Vec<String>,
}

/// Adds/overwrites and removes query-string parameters.
pub struct QueryParamFilter;

#[async_trait]
impl Filter for QueryParamFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        ctx.snapshot_if_absent(false);
        let cfg: QueryParamFilterConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let mut params: Vec<(String, String)> = ctx
            .query
            .as_deref()
            .map(|q| urlencoding::decode(q).map(|s| s.into_owned()).unwrap_or_default())
            .map(|q| {
                q.split('&')
                    .filter(|p| !p.is_empty())
                    .filter_map(|p| p.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        params.retain(|(k, _)| !cfg.remove.contains(k));
        for (k, v) in cfg.set {
            if let Some(existing) = params.iter_mut().find(|(ek, _)| *ek == k) {
                existing.1 = v;
            } else {
                params.push((k, v));
            }
        }

        ctx.query = if params.is_empty() {
            None
        } else {
            Some(
                params
                    .into_iter()
                    .map(|(k, v)| format!("{}={}", urlencoding::encode(&k), urlencoding::encode(&v)))
                    .collect::<Vec<_>>()
                    .join("&"),
            )
        };
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
    async fn adds_and_removes_params() {
        let mut ctx = RequestContext::new("GET", "/x", Ipv4Addr::LOCALHOST.into(), "trace1");
        ctx.query = Some("a=1&b=2".to_string());
        QueryParamFilter
            .apply(&mut ctx, &json!({"set": {"c": "3"}, "remove": ["a"]}))
            .await;
        let q = ctx.query.unwrap();
        assert!(q.contains("b=2"));
        assert!(q.contains("c=3"));
        assert!(!q.contains("a=1"));
    }
}
