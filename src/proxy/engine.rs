// src/proxy/engine.rs

//! Ties instance selection, forwarding, and retry together for the `http`
//! proxy type (spec.md section 4.E). `tcp`/`udp`/`websocket` are driven
//! directly by the tunnel engine and the listener's upgrade path since
//! they operate on raw connections rather than a request/response cycle.

use crate::core::GatewayError;
use crate::model::{ServiceDefinition, ServiceInstance};
use crate::proxy::breaker::CircuitBreakerRegistry;
use crate::proxy::http::HttpForwarder;
use crate::proxy::lb::LoadBalancer;
use crate::proxy::retry::{is_replayable, RetryPolicy};
use crate::registry::ServiceRegistry;
use crate::router::context::RequestContext;
use std::sync::Arc;
use tracing::warn;

pub struct ProxyEngine {
    registry: ServiceRegistry,
    lb: LoadBalancer,
    breaker: Arc<CircuitBreakerRegistry>,
    http: HttpForwarder,
    retry: RetryPolicy,
}

impl ProxyEngine {
    pub fn new(
        registry: ServiceRegistry,
        lb: LoadBalancer,
        breaker: Arc<CircuitBreakerRegistry>,
        http: HttpForwarder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            lb,
            breaker,
            http,
            retry,
        }
    }

    /// Resolves and selects one instance of `service` without forwarding
    /// anything, for callers that drive the actual byte stream themselves
    /// (the websocket upgrade path in the ingress listener; spec.md section
    /// 4.E's "tcp/udp/websocket bypass `forward`" note above). Records no
    /// breaker outcome since the caller owns the connection's lifetime and
    /// must report success/failure back via [`ProxyEngine::record_outcome`].
    pub async fn select_instance(&self, ctx: &RequestContext, service: &ServiceDefinition) -> Result<ServiceInstance, GatewayError> {
        let instances = self.registry.resolve(&service.service_id).await?;
        if instances.is_empty() {
            return Err(GatewayError::ServiceUnavailable(service.service_id.clone()));
        }
        let instance = self.lb.select(&service.service_id, service.load_balance_strategy, &instances, &self.breaker, Some(ctx.client_ip));
        let Some(instance) = instance else {
            return Err(GatewayError::CircuitBreakerOpen {
                service_id: service.service_id.clone(),
                instance_id: "*".to_string(),
            });
        };
        Ok(instance.clone())
    }

    /// Reports a connection-level outcome for an instance picked via
    /// [`ProxyEngine::select_instance`] back to the circuit breaker, since
    /// that path has no HTTP status code to infer success/failure from.
    pub fn record_outcome(&self, service_id: &str, instance_id: &str, success: bool) {
        let now = crate::eventbus::now_millis();
        if success {
            self.breaker.record_success(service_id, instance_id, now);
        } else {
            self.breaker.record_failure(service_id, instance_id, now);
        }
    }

    /// Resolves, selects, and forwards `ctx` to `service`, retrying on
    /// transient failures up to `retry.max_attempts`, each attempt against
    /// a different instance (spec.md section 4.E).
    pub async fn forward(&self, ctx: &mut RequestContext, service: &ServiceDefinition, upstream_scheme: &str) -> Result<(), GatewayError> {
        let instances = self.registry.resolve(&service.service_id).await?;
        if instances.is_empty() {
            return Err(GatewayError::ServiceUnavailable(service.service_id.clone()));
        }

        let replayable = is_replayable(false, false);
        let mut last_error = None;

        for attempt in 0..self.retry.max_attempts.max(1) {
            let instance = self.lb.select(
                &service.service_id,
                service.load_balance_strategy,
                &instances,
                &self.breaker,
                Some(ctx.client_ip),
            );
            let Some(instance) = instance else {
                return Err(GatewayError::CircuitBreakerOpen {
                    service_id: service.service_id.clone(),
                    instance_id: "*".to_string(),
                });
            };

            let upstream_base = format!("{upstream_scheme}://{}:{}", instance.host, instance.port);
            self.lb.on_connection_opened(&instance.instance_id);
            let outcome = self.http.forward(ctx, &upstream_base).await;
            self.lb.on_connection_closed(&instance.instance_id);

            let now = crate::eventbus::now_millis();
            match outcome {
                Ok(status) if !RetryPolicy::is_transient_status(status) => {
                    self.breaker.record_success(&service.service_id, &instance.instance_id, now);
                    return Ok(());
                }
                Ok(status) => {
                    self.breaker.record_failure(&service.service_id, &instance.instance_id, now);
                    last_error = Some(GatewayError::UpstreamError(format!("upstream status {status}")));
                }
                Err(e) => {
                    self.breaker.record_failure(&service.service_id, &instance.instance_id, now);
                    last_error = Some(GatewayError::UpstreamError(e.to_string()));
                }
            }

            if !replayable || attempt + 1 >= self.retry.max_attempts {
                break;
            }
            ctx.retry_count += 1;
            crate::core::metrics::PrometheusMeter.incr_counter("retries_total", &[]);
            warn!(service_id = %service.service_id, attempt, "retrying proxy request on a different instance");
            tokio::time::sleep(self.retry.backoff(attempt)).await;
        }

        Err(last_error.unwrap_or_else(|| GatewayError::ServiceUnavailable(service.service_id.clone())))
    }
}
