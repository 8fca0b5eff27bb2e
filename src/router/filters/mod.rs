// src/router/filters/mod.rs

//! Concrete `Filter` implementations for each `FilterType` named in
//! spec.md section 4.D.

mod auth;
mod cors;
mod header;
mod ip_access;
mod log;
mod method;
mod query_param;
mod rate_limit;
mod rewrite;
mod strip;

pub use auth::AuthFilter;
pub use cors::CorsFilter;
pub use header::HeaderFilter;
pub use ip_access::IpAccessFilter;
pub use log::LogFilter;
pub use method::MethodFilter;
pub use query_param::QueryParamFilter;
pub use rate_limit::RateLimitFilter;
pub use rewrite::RewriteFilter;
pub use strip::StripFilter;
