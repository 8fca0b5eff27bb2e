// src/router/chain.rs

//! Executes the ordered pre-routing / pre-proxy / post-proxy filter phases
//! (spec.md section 4.D "Filter chain").

use crate::core::GatewayError;
use crate::model::FilterRef;
use crate::router::context::RequestContext;
use crate::router::filter::{partition_by_action, FilterRegistry};

pub struct FilterChain {
    registry: FilterRegistry,
    max_depth: u32,
}

impl FilterChain {
    pub fn new(registry: FilterRegistry, max_depth: u32) -> Self {
        Self { registry, max_depth }
    }

    /// Runs the `PreRouting` phase. Only global filters apply — the route
    /// isn't known yet (spec.md section 4.D step 1).
    pub async fn run_pre_routing(
        &self,
        ctx: &mut RequestContext,
        global_refs: &[FilterRef],
    ) -> Result<(), GatewayError> {
        let (pre_routing, _, _) = partition_by_action(global_refs);
        self.run_phase(ctx, &pre_routing).await
    }

    /// Runs the `PreProxy` phase: global filters first, then the matched
    /// route's own filters (spec.md section 4.D step 3).
    pub async fn run_pre_proxy(
        &self,
        ctx: &mut RequestContext,
        global_refs: &[FilterRef],
        route_refs: &[FilterRef],
    ) -> Result<(), GatewayError> {
        let (_, global_pre_proxy, _) = partition_by_action(global_refs);
        let (_, route_pre_proxy, _) = partition_by_action(route_refs);
        self.run_phase(ctx, &global_pre_proxy).await?;
        if !ctx.is_terminated() {
            self.run_phase(ctx, &route_pre_proxy).await?;
        }
        Ok(())
    }

    /// Runs the `PostProxy` phase in reverse registration order. Unlike the
    /// earlier phases, post-proxy filters always run even if the request
    /// was already short-circuited (spec.md section 4.D).
    pub async fn run_post_proxy(
        &self,
        ctx: &mut RequestContext,
        global_refs: &[FilterRef],
        route_refs: &[FilterRef],
    ) -> Result<(), GatewayError> {
        let (_, _, global_post) = partition_by_action(global_refs);
        let (_, _, route_post) = partition_by_action(route_refs);
        let mut combined: Vec<&FilterRef> = route_post.into_iter().chain(global_post).collect();
        combined.reverse();
        self.run_phase_always(ctx, &combined).await
    }

    async fn run_phase(&self, ctx: &mut RequestContext, refs: &[&FilterRef]) -> Result<(), GatewayError> {
        for filter_ref in refs {
            if ctx.is_terminated() {
                break;
            }
            self.apply_one(ctx, filter_ref).await?;
        }
        Ok(())
    }

    /// Like `run_phase` but never short-circuits on an already-set
    /// response: used for `PostProxy`, which must still run after a filter
    /// or the proxy stage terminated the request.
    async fn run_phase_always(&self, ctx: &mut RequestContext, refs: &[&FilterRef]) -> Result<(), GatewayError> {
        for filter_ref in refs {
            self.apply_one(ctx, filter_ref).await?;
        }
        Ok(())
    }

    async fn apply_one(&self, ctx: &mut RequestContext, filter_ref: &FilterRef) -> Result<(), GatewayError> {
        ctx.enter_filter(self.max_depth)?;
        if let Some(filter) = self.registry.resolve(filter_ref.filter_type) {
            if filter.is_mutating() {
                let capture_headers = matches!(filter_ref.filter_type, crate::model::FilterType::Header);
                ctx.snapshot_if_absent(capture_headers);
            }
            filter.apply(ctx, &filter_ref.config).await;
            ctx.matched_filter_ids.push(filter_ref.filter_id.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterAction, FilterType};
    use serde_json::json;
    use std::net::Ipv4Addr;

    fn filter_ref(id: &str, action: FilterAction, filter_type: FilterType, order: i32, config: serde_json::Value) -> FilterRef {
        FilterRef {
            filter_id: id.to_string(),
            action,
            filter_type,
            order,
            enabled: true,
            parallel: false,
            config,
        }
    }

    #[tokio::test]
    async fn auth_failure_short_circuits_remaining_pre_proxy_filters() {
        let chain = FilterChain::new(FilterRegistry::with_builtins(), 10);
        let mut ctx = RequestContext::new("GET", "/secure", Ipv4Addr::LOCALHOST.into(), "t1");
        let refs = vec![
            filter_ref("auth", FilterAction::PreProxy, FilterType::Auth, 1, json!({})),
            filter_ref("hdr", FilterAction::PreProxy, FilterType::Header, 2, json!({"set": {"x": "y"}})),
        ];
        chain.run_pre_proxy(&mut ctx, &[], &refs).await.unwrap();
        assert_eq!(ctx.response.unwrap().status, 401);
        assert!(!ctx.headers.contains_key("x"));
    }

    #[tokio::test]
    async fn post_proxy_runs_even_after_short_circuit() {
        let chain = FilterChain::new(FilterRegistry::with_builtins(), 10);
        let mut ctx = RequestContext::new("GET", "/secure", Ipv4Addr::LOCALHOST.into(), "t1");
        ctx.response = Some(crate::router::context::FilterResponse::new(401, Vec::new()));
        let refs = vec![filter_ref("cors", FilterAction::PostProxy, FilterType::Cors, 1, json!({}))];
        chain.run_post_proxy(&mut ctx, &[], &refs).await.unwrap();
        assert!(ctx
            .response
            .unwrap()
            .headers
            .contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn depth_guard_trips_on_excessive_filters() {
        let chain = FilterChain::new(FilterRegistry::with_builtins(), 1);
        let mut ctx = RequestContext::new("GET", "/x", Ipv4Addr::LOCALHOST.into(), "t1");
        let refs = vec![
            filter_ref("log1", FilterAction::PreProxy, FilterType::Log, 1, json!({})),
            filter_ref("log2", FilterAction::PreProxy, FilterType::Log, 2, json!({})),
        ];
        let err = chain.run_pre_proxy(&mut ctx, &[], &refs).await.unwrap_err();
        assert!(matches!(err, GatewayError::FilterChainDepthExceeded { .. }));
    }
}
