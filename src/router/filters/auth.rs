// src/router/filters/auth.rs

//! A bearer-token presence check. Concrete credential issuance/validation
//! against an identity provider is out of scope (spec.md section 4.D
//! Non-goals: "concrete auth/session issuance"); this filter only enforces
//! that *some* well-formed token accompanies the request.

use crate::router::context::{FilterResponse, RequestContext};
use crate::router::filter::Filter;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
struct AuthFilterConfig {
    #[serde(default = "default_header")]
    header: String,
    #[serde(default = "default_scheme")]
    scheme: String,
}

fn default_header() -> String {
    "authorization".to_string()
}

fn default_scheme() -> String {
    "Bearer".to_string()
}

pub struct AuthFilter;

#[async_trait]
impl Filter for AuthFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let cfg: AuthFilterConfig = serde_json::from_value(config.clone()).unwrap_or_default();
        let header_value = ctx
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&cfg.header))
            .map(|(_, v)| v.as_str());

        let has_valid_scheme = header_value
            .map(|v| v.starts_with(&cfg.scheme) && v.len() > cfg.scheme.len() + 1)
            .unwrap_or(false);

        if !has_valid_scheme {
            ctx.response = Some(FilterResponse::new(401, b"missing or malformed credentials".to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn rejects_missing_token() {
        let mut ctx = RequestContext::new("GET", "/secure", Ipv4Addr::LOCALHOST.into(), "t1");
        AuthFilter.apply(&mut ctx, &json!({})).await;
        assert_eq!(ctx.response.unwrap().status, 401);
    }

    #[tokio::test]
    async fn accepts_well_formed_bearer_token() {
        let mut ctx = RequestContext::new("GET", "/secure", Ipv4Addr::LOCALHOST.into(), "t1");
        ctx.headers.insert("authorization".to_string(), "Bearer abc123".to_string());
        AuthFilter.apply(&mut ctx, &json!({})).await;
        assert!(ctx.response.is_none());
    }
}
