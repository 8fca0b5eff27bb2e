// src/router/filter.rs

//! The `Filter` trait every concrete filter type implements, plus the
//! registry that resolves a `FilterRef` to its live instance.

use crate::model::{FilterRef, FilterType};
use crate::router::context::RequestContext;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// One step of the pre-routing/pre-proxy/post-proxy pipeline. Implementors
/// mutate `ctx` in place and may set `ctx.response` to short-circuit.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn apply(&self, ctx: &mut RequestContext, config: &serde_json::Value);

    /// Whether this filter type mutates the request, and therefore forces
    /// a pre-mutation snapshot (spec.md section 4.D).
    fn is_mutating(&self) -> bool {
        false
    }
}

/// Resolves `FilterType` to its live `Filter` implementation. One instance
/// per type is shared; per-route behavior comes from the `FilterRef`'s
/// `config` JSON passed at apply-time.
#[derive(Clone)]
pub struct FilterRegistry {
    by_type: Arc<DashMap<FilterTypeKey, Arc<dyn Filter>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FilterTypeKey(FilterType);

impl std::hash::Hash for FilterType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u8).hash(state)
    }
}

impl FilterRegistry {
    pub fn with_builtins() -> Self {
        let registry = Self {
            by_type: Arc::new(DashMap::new()),
        };
        registry.register(FilterType::Header, Arc::new(super::filters::HeaderFilter));
        registry.register(FilterType::QueryParam, Arc::new(super::filters::QueryParamFilter));
        registry.register(FilterType::Method, Arc::new(super::filters::MethodFilter));
        registry.register(FilterType::Strip, Arc::new(super::filters::StripFilter));
        registry.register(FilterType::Rewrite, Arc::new(super::filters::RewriteFilter));
        registry.register(FilterType::Auth, Arc::new(super::filters::AuthFilter));
        registry.register(FilterType::RateLimit, Arc::new(super::filters::RateLimitFilter::default()));
        registry.register(FilterType::Cors, Arc::new(super::filters::CorsFilter));
        registry.register(FilterType::IpAccess, Arc::new(super::filters::IpAccessFilter));
        registry.register(FilterType::Log, Arc::new(super::filters::LogFilter));
        registry
    }

    pub fn register(&self, filter_type: FilterType, filter: Arc<dyn Filter>) {
        self.by_type.insert(FilterTypeKey(filter_type), filter);
    }

    pub fn resolve(&self, filter_type: FilterType) -> Option<Arc<dyn Filter>> {
        self.by_type.get(&FilterTypeKey(filter_type)).map(|f| f.clone())
    }
}

/// Splits a route's `filterRefs` into the three phases, each already
/// ordered by `order` (spec.md section 4.D).
pub fn partition_by_action(refs: &[FilterRef]) -> (Vec<&FilterRef>, Vec<&FilterRef>, Vec<&FilterRef>) {
    use crate::model::FilterAction::*;
    let mut pre_routing = Vec::new();
    let mut pre_proxy = Vec::new();
    let mut post_proxy = Vec::new();
    for r in refs.iter().filter(|r| r.enabled) {
        match r.action {
            PreRouting => pre_routing.push(r),
            PreProxy => pre_proxy.push(r),
            PostProxy => post_proxy.push(r),
        }
    }
    pre_routing.sort_by_key(|r| r.order);
    pre_proxy.sort_by_key(|r| r.order);
    post_proxy.sort_by_key(|r| r.order);
    (pre_routing, pre_proxy, post_proxy)
}
