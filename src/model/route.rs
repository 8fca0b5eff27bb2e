// src/model/route.rs

//! `RouteConfig` — a match rule plus forwarding directive (spec.md section
//! 3 / section 4.D).

use super::audit::AuditFields;
use serde::{Deserialize, Serialize};

pub const TABLE: &str = "HUB_ROUTE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Exact,
    Prefix,
    Regex,
}

/// The phase a filter runs in (spec.md section 4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterAction {
    PreRouting,
    PreProxy,
    PostProxy,
}

/// The filter's transformation/policy kind (spec.md section 4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    QueryParam,
    Header,
    Body,
    Url,
    Strip,
    Rewrite,
    Method,
    Auth,
    RateLimit,
    Cors,
    IpAccess,
    Log,
}

impl FilterType {
    /// Whether this filter type mutates the request and therefore requires
    /// the original-request snapshot before it runs (spec.md section 4.D).
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            FilterType::QueryParam
                | FilterType::Header
                | FilterType::Body
                | FilterType::Url
                | FilterType::Strip
                | FilterType::Rewrite
                | FilterType::Method
        )
    }
}

/// A reference from a route (or the global chain) to a configured filter
/// instance, carrying its ordering and execution mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRef {
    pub filter_id: String,
    pub action: FilterAction,
    pub filter_type: FilterType,
    pub order: i32,
    pub enabled: bool,
    pub parallel: bool,
    /// Free-form JSON configuration consumed by the concrete filter impl.
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub route_id: String,
    pub priority: i32,
    pub match_type: MatchType,
    pub path_pattern: String,
    pub methods: Vec<String>,
    pub case_sensitive: bool,
    pub remove_trailing_slash: bool,
    pub service_ref: String,
    pub filter_refs: Vec<FilterRef>,
    pub is_fallback: bool,
    pub enabled: bool,
    pub audit: AuditFields,
}

impl RouteConfig {
    /// Deterministic ordering key: lower priority first, ties broken by
    /// lexicographically smaller `route_id` (spec.md section 3 invariant).
    pub fn sort_key(&self) -> (i32, &str) {
        (self.priority, self.route_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_breaks_ties_on_route_id() {
        let mut routes = vec![
            make_route("r9", 5),
            make_route("r1", 5),
            make_route("r2", 1),
        ];
        routes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let ids: Vec<&str> = routes.iter().map(|r| r.route_id.as_str()).collect();
        assert_eq!(ids, vec!["r2", "r1", "r9"]);
    }

    fn make_route(id: &str, priority: i32) -> RouteConfig {
        RouteConfig {
            route_id: id.to_string(),
            priority,
            match_type: MatchType::Prefix,
            path_pattern: "/".to_string(),
            methods: vec!["GET".to_string()],
            case_sensitive: true,
            remove_trailing_slash: true,
            service_ref: "svc".to_string(),
            filter_refs: vec![],
            is_fallback: false,
            enabled: true,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }
}
