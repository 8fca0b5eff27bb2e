// src/router/mod.rs

//! The router: route matching plus the filter chain (spec.md section 4.D).
//! The live route table is read-mostly and swapped atomically on
//! event-bus-driven reloads, grounded in the teacher's
//! `acl_config: RwLock<Arc<AclConfig>>` pattern (`core/state/core.rs`).

pub mod chain;
pub mod context;
pub mod filter;
pub mod filters;
pub mod matcher;

pub use chain::FilterChain;
pub use context::{FilterResponse, RequestContext, RequestSnapshot};
pub use filter::{Filter, FilterRegistry};
pub use matcher::RouteTable;

use crate::core::GatewayError;
use crate::model::{FilterRef, RouteConfig};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Router {
    table: RwLock<Arc<RouteTable>>,
    global_filters: RwLock<Arc<Vec<FilterRef>>>,
    chain: FilterChain,
}

impl Router {
    pub fn new(routes: Vec<RouteConfig>, global_filters: Vec<FilterRef>, registry: FilterRegistry, max_filter_chain_depth: u32) -> Self {
        Self {
            table: RwLock::new(Arc::new(RouteTable::build(routes))),
            global_filters: RwLock::new(Arc::new(global_filters)),
            chain: FilterChain::new(registry, max_filter_chain_depth),
        }
    }

    /// Atomically swaps in a freshly rebuilt route table. Called by the
    /// `RouteChanged` event handler.
    pub async fn reload_routes(&self, routes: Vec<RouteConfig>) {
        let mut guard = self.table.write().await;
        *guard = Arc::new(RouteTable::build(routes));
    }

    pub async fn reload_global_filters(&self, filters: Vec<FilterRef>) {
        let mut guard = self.global_filters.write().await;
        *guard = Arc::new(filters);
    }

    /// Runs pre-routing filters, matches a route, then runs pre-proxy
    /// filters. Returns `None` once `ctx.response` is set (short-circuited
    /// before a route was needed, or no route matched and no fallback is
    /// configured).
    pub async fn route(&self, ctx: &mut RequestContext) -> Result<Option<RouteConfig>, GatewayError> {
        let global_filters = self.global_filters.read().await.clone();
        self.chain.run_pre_routing(ctx, &global_filters).await?;
        if ctx.is_terminated() {
            return Ok(None);
        }

        let table = self.table.read().await.clone();
        let route = table.find(&ctx.method, &ctx.path).cloned();
        let Some(route) = route else {
            return Err(GatewayError::RouteNotFound {
                method: ctx.method.clone(),
                path: ctx.path.clone(),
            });
        };
        ctx.route_id = Some(route.route_id.clone());
        ctx.service_id = Some(route.service_ref.clone());

        self.chain.run_pre_proxy(ctx, &global_filters, &route.filter_refs).await?;
        Ok(Some(route))
    }

    pub async fn run_post_proxy(&self, ctx: &mut RequestContext, route: &RouteConfig) -> Result<(), GatewayError> {
        let global_filters = self.global_filters.read().await.clone();
        self.chain
            .run_post_proxy(ctx, &global_filters, &route.filter_refs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditFields, MatchType};
    use std::net::Ipv4Addr;

    fn sample_route() -> RouteConfig {
        RouteConfig {
            route_id: "r1".to_string(),
            priority: 1,
            match_type: MatchType::Prefix,
            path_pattern: "/api".to_string(),
            methods: vec!["GET".to_string()],
            case_sensitive: true,
            remove_trailing_slash: true,
            service_ref: "svc1".to_string(),
            filter_refs: vec![],
            is_fallback: false,
            enabled: true,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[tokio::test]
    async fn routes_to_matching_path() {
        let router = Router::new(vec![sample_route()], vec![], FilterRegistry::with_builtins(), 20);
        let mut ctx = RequestContext::new("GET", "/api/widgets", Ipv4Addr::LOCALHOST.into(), "t1");
        let route = router.route(&mut ctx).await.unwrap().unwrap();
        assert_eq!(route.route_id, "r1");
        assert_eq!(ctx.service_id.as_deref(), Some("svc1"));
    }

    #[tokio::test]
    async fn no_match_is_route_not_found() {
        let router = Router::new(vec![sample_route()], vec![], FilterRegistry::with_builtins(), 20);
        let mut ctx = RequestContext::new("GET", "/other", Ipv4Addr::LOCALHOST.into(), "t1");
        let err = router.route(&mut ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn reload_routes_swaps_table_atomically() {
        let router = Router::new(vec![], vec![], FilterRegistry::with_builtins(), 20);
        let mut ctx = RequestContext::new("GET", "/api/widgets", Ipv4Addr::LOCALHOST.into(), "t1");
        assert!(router.route(&mut ctx).await.is_err());

        router.reload_routes(vec![sample_route()]).await;
        let mut ctx2 = RequestContext::new("GET", "/api/widgets", Ipv4Addr::LOCALHOST.into(), "t2");
        assert!(router.route(&mut ctx2).await.unwrap().is_some());
    }
}
