// src/router/filters/rate_limit.rs

use crate::core::TokenBucket;
use crate::router::context::{FilterResponse, RequestContext};
use crate::router::filter::Filter;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RateLimitFilterConfig {
    count: u32,
    window_secs: u64,
}

/// Per-client-IP token bucket rate limit. Buckets are keyed by client IP so
/// one noisy client can't starve another (spec.md section 4.D `RateLimit`).
#[derive(Default)]
pub struct RateLimitFilter {
    buckets: DashMap<std::net::IpAddr, TokenBucket>,
}

#[async_trait]
impl Filter for RateLimitFilter {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value) {
        let Ok(cfg) = serde_json::from_value::<RateLimitFilterConfig>(config.clone()) else {
            return;
        };
        let allowed = self
            .buckets
            .entry(ctx.client_ip)
            .or_insert_with(|| TokenBucket::new(cfg.count, Duration::from_secs(cfg.window_secs.max(1))))
            .try_acquire();
        if !allowed {
            ctx.response = Some(FilterResponse::new(429, b"rate limit exceeded".to_vec()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn blocks_after_budget_exhausted() {
        let filter = RateLimitFilter::default();
        let cfg = json!({"count": 1, "window_secs": 60});
        let mut first = RequestContext::new("GET", "/x", Ipv4Addr::LOCALHOST.into(), "t1");
        filter.apply(&mut first, &cfg).await;
        assert!(first.response.is_none());

        let mut second = RequestContext::new("GET", "/x", Ipv4Addr::LOCALHOST.into(), "t2");
        filter.apply(&mut second, &cfg).await;
        assert_eq!(second.response.unwrap().status, 429);
    }
}
