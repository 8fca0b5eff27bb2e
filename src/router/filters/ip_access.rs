// src/router/filters/ip_access.rs

use crate::router::context::{FilterResponse, RequestContext};
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct IpAccessFilterConfig {
    #[serde(default)]
    allow: Vec<String>,
    #[serde(default)]
    deny: Vec<String>,
}

/// Allow/deny list on the client IP. `deny` is checked first; an empty
/// `allow` list means "allow everything not denied".
pub struct IpAccessFilter;

#[async_trait]
impl Filter for IpAccessFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let cfg: IpAccessFilterConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let ip = ctx.client_ip.to_string();
        if cfg.deny.iter().any(|d| d == &ip) {
            ctx.response = Some(FilterResponse::new(403, b"ip denied".to_vec()));
            return;
        }
        if !cfg.allow.is_empty() && !cfg.allow.iter().any(|a| a == &ip) {
            ctx.response = Some(FilterResponse::new(403, b"ip not allowed".to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn denies_listed_ip() {
        let mut ctx = RequestContext::new("GET", "/x", Ipv4Addr::new(10, 0, 0, 1).into(), "t1");
        IpAccessFilter
            .apply(&mut ctx, &json!({"deny": ["10.0.0.1"]}))
            .await;
        assert_eq!(ctx.response.unwrap().status, 403);
    }

    #[tokio::test]
    async fn allow_list_rejects_non_members() {
        let mut ctx = RequestContext::new("GET", "/x", Ipv4Addr::new(10, 0, 0, 2).into(), "t1");
        IpAccessFilter
            .apply(&mut ctx, &json!({"allow": ["10.0.0.1"]}))
            .await;
        assert_eq!(ctx.response.unwrap().status, 403);
    }
}
