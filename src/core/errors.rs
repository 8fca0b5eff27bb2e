// src/core/errors.rs

//! The primary error type for the gateway core, and the error-code taxonomy
//! (spec.md section 6) that access-log entries and HTTP responses share.

use thiserror::Error;

/// The normative error codes a request can be tagged with in the access log
/// and surfaced to the caller (spec.md section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    RouteNotFound,
    ServiceUnavailable,
    AuthenticationFailed,
    AuthorizationFailed,
    RateLimitExceeded,
    CircuitBreakerOpen,
    InvalidRequest,
    UpstreamError,
    Timeout,
    InternalError,
}

impl GatewayErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteNotFound => "ROUTE_NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::AuthorizationFailed => "AUTHORIZATION_FAILED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// The gateway-owned HTTP status associated with this error code.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound => 404,
            Self::ServiceUnavailable => 503,
            Self::AuthenticationFailed => 401,
            Self::AuthorizationFailed => 403,
            Self::RateLimitExceeded => 429,
            Self::CircuitBreakerOpen => 521,
            Self::InvalidRequest => 400,
            Self::UpstreamError => 502,
            Self::Timeout => 504,
            Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The main error enum. Errors are categorized (spec.md section 7), not
/// typed per exception; each variant maps to exactly one `GatewayErrorCode`.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("route not found for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("no eligible instance for service '{0}'")]
    ServiceUnavailable(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("circuit breaker open for {service_id}/{instance_id}")]
    CircuitBreakerOpen {
        service_id: String,
        instance_id: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("filter chain depth exceeded ({depth} > {max})")]
    FilterChainDepthExceeded { depth: usize, max: usize },

    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Maps this error onto the normative error-code taxonomy.
    pub fn code(&self) -> GatewayErrorCode {
        match self {
            Self::RouteNotFound { .. } => GatewayErrorCode::RouteNotFound,
            Self::ServiceUnavailable(_) => GatewayErrorCode::ServiceUnavailable,
            Self::AuthenticationFailed(_) => GatewayErrorCode::AuthenticationFailed,
            Self::AuthorizationFailed(_) => GatewayErrorCode::AuthorizationFailed,
            Self::RateLimitExceeded => GatewayErrorCode::RateLimitExceeded,
            Self::CircuitBreakerOpen { .. } => GatewayErrorCode::CircuitBreakerOpen,
            Self::InvalidRequest(_) => GatewayErrorCode::InvalidRequest,
            Self::UpstreamError(_) => GatewayErrorCode::UpstreamError,
            Self::Timeout(_) => GatewayErrorCode::Timeout,
            Self::FilterChainDepthExceeded { .. } => GatewayErrorCode::InternalError,
            Self::Store(_) => GatewayErrorCode::InternalError,
            Self::Internal(_) => GatewayErrorCode::InternalError,
        }
    }

    /// Whether this failure is eligible for a retry on a different instance
    /// (spec.md section 4.E / section 7: transient upstream errors only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamError(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_open_maps_to_521() {
        let err = GatewayError::CircuitBreakerOpen {
            service_id: "s1".into(),
            instance_id: "i1".into(),
        };
        assert_eq!(err.code().status_code(), 521);
        assert_eq!(err.code().as_str(), "CIRCUIT_BREAKER_OPEN");
    }

    #[test]
    fn upstream_error_is_transient_but_route_not_found_is_not() {
        assert!(GatewayError::UpstreamError("boom".into()).is_transient());
        assert!(
            !GatewayError::RouteNotFound {
                method: "GET".into(),
                path: "/x".into()
            }
            .is_transient()
        );
    }
}
