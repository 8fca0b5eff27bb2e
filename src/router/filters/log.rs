// src/router/filters/log.rs

use crate::router::context::RequestContext;
use crate::router::filter::Filter;
use async_trait::async_trait;
use tracing::debug;

/// A read-only filter that emits a trace event. Safe to run in `PARALLEL`
/// mode alongside other read-only filters (spec.md section 4.D).
pub struct LogFilter;

#[async_trait]
impl Filter for LogFilter {
    async fn apply(&self, ctx: &mut RequestContext, _config: &serde_json::Value) {
        debug!(trace_id = %ctx.trace_id, method = %ctx.method, path = %ctx.path, "filter chain log point");
    }
}
