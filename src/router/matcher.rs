// src/router/matcher.rs

//! Route matching: priority-ordered walk with a prefix-trie fast path for
//! large tables (spec.md section 4.D "Match").

use crate::model::{MatchType, RouteConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

/// Above this many routes, a two-level prefix-trie keyed on the first path
/// segment narrows the linear scan (spec.md section 4.D).
const TRIE_THRESHOLD: usize = 100;

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> = Lazy::new(|| RwLock::new(HashMap::new()));

fn cached_regex(pattern: &str) -> Option<Regex> {
    if let Some(re) = REGEX_CACHE.read().unwrap().get(pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(pattern).ok()?;
    REGEX_CACHE.write().unwrap().insert(pattern.to_string(), re.clone());
    Some(re)
}

/// An immutable, priority-sorted view of a gateway instance's enabled
/// routes, rebuilt on every event-bus-driven config reload.
pub struct RouteTable {
    routes: Vec<RouteConfig>,
    by_first_segment: HashMap<String, Vec<usize>>,
    regex_tail: Vec<usize>,
    fallback: Option<usize>,
}

impl RouteTable {
    pub fn build(mut routes: Vec<RouteConfig>) -> Self {
        routes.retain(|r| r.enabled);
        routes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let fallback = routes.iter().position(|r| r.is_fallback);
        let mut by_first_segment: HashMap<String, Vec<usize>> = HashMap::new();
        let mut regex_tail = Vec::new();

        if routes.len() > TRIE_THRESHOLD {
            for (idx, route) in routes.iter().enumerate() {
                match route.match_type {
                    MatchType::Regex => regex_tail.push(idx),
                    _ => {
                        let seg = first_segment(&route.path_pattern);
                        by_first_segment.entry(seg).or_default().push(idx);
                    }
                }
            }
        }

        Self {
            routes,
            by_first_segment,
            regex_tail,
            fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the highest-priority enabled route matching `method`/`path`.
    /// Falls back to the configured fallback route, if any, on no match.
    pub fn find(&self, method: &str, path: &str) -> Option<&RouteConfig> {
        if self.routes.len() > TRIE_THRESHOLD {
            let seg = first_segment(path);
            if let Some(indices) = self.by_first_segment.get(&seg) {
                for &idx in indices {
                    if route_matches(&self.routes[idx], method, path) {
                        return Some(&self.routes[idx]);
                    }
                }
            }
            for &idx in &self.regex_tail {
                if route_matches(&self.routes[idx], method, path) {
                    return Some(&self.routes[idx]);
                }
            }
        } else {
            for route in &self.routes {
                if route_matches(route, method, path) {
                    return Some(route);
                }
            }
        }
        self.fallback.map(|idx| &self.routes[idx])
    }
}

fn first_segment(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
        .to_string()
}

fn route_matches(route: &RouteConfig, method: &str, path: &str) -> bool {
    if route.is_fallback {
        return false;
    }
    if !route.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
        return false;
    }
    let (candidate_path, pattern) = if route.case_sensitive {
        (normalize(path, route.remove_trailing_slash), route.path_pattern.clone())
    } else {
        (
            normalize(&path.to_ascii_lowercase(), route.remove_trailing_slash),
            route.path_pattern.to_ascii_lowercase(),
        )
    };

    match route.match_type {
        MatchType::Exact => candidate_path == pattern,
        MatchType::Prefix => {
            candidate_path == pattern
                || (candidate_path.starts_with(&pattern)
                    && (pattern.ends_with('/')
                        || candidate_path[pattern.len()..].starts_with('/')
                        || candidate_path.len() == pattern.len()))
        }
        MatchType::Regex => cached_regex(&route.path_pattern)
            .map(|re| re.is_match(path))
            .unwrap_or(false),
    }
}

fn normalize(path: &str, remove_trailing_slash: bool) -> String {
    if remove_trailing_slash && path.len() > 1 && path.ends_with('/') {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuditFields;

    fn route(id: &str, priority: i32, match_type: MatchType, pattern: &str, fallback: bool) -> RouteConfig {
        RouteConfig {
            route_id: id.to_string(),
            priority,
            match_type,
            path_pattern: pattern.to_string(),
            methods: vec!["GET".to_string()],
            case_sensitive: true,
            remove_trailing_slash: true,
            service_ref: "svc".to_string(),
            filter_refs: vec![],
            is_fallback: fallback,
            enabled: true,
            audit: AuditFields::new("t1", "sys", 0),
        }
    }

    #[test]
    fn prefix_match_respects_segment_boundary() {
        let table = RouteTable::build(vec![route("r1", 1, MatchType::Prefix, "/api", false)]);
        assert!(table.find("GET", "/api/widgets").is_some());
        assert!(table.find("GET", "/apiextra").is_none());
    }

    #[test]
    fn lower_priority_number_wins_first() {
        let table = RouteTable::build(vec![
            route("zzz", 5, MatchType::Prefix, "/", false),
            route("aaa", 1, MatchType::Prefix, "/", false),
        ]);
        assert_eq!(table.find("GET", "/anything").unwrap().route_id, "aaa");
    }

    #[test]
    fn tie_on_priority_breaks_by_route_id() {
        let table = RouteTable::build(vec![
            route("bbb", 1, MatchType::Prefix, "/x", false),
            route("aaa", 1, MatchType::Prefix, "/x", false),
        ]);
        assert_eq!(table.find("GET", "/x").unwrap().route_id, "aaa");
    }

    #[test]
    fn no_match_falls_back() {
        let table = RouteTable::build(vec![
            route("r1", 1, MatchType::Exact, "/only", false),
            route("fb", 99, MatchType::Prefix, "/", true),
        ]);
        assert_eq!(table.find("GET", "/nope").unwrap().route_id, "fb");
    }

    #[test]
    fn regex_route_matches_pattern() {
        let table = RouteTable::build(vec![route("r1", 1, MatchType::Regex, r"^/items/\d+$", false)]);
        assert!(table.find("GET", "/items/42").is_some());
        assert!(table.find("GET", "/items/abc").is_none());
    }
}
