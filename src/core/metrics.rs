// src/core/metrics.rs

//! The `Meter` contract the core emits counters through (spec.md section 1:
//! "Metrics collection code... core only emits counters through a `Meter`
//! interface"), plus a default Prometheus-backed implementation. Mirrors the
//! teacher's `lazy_static!`-registered Prometheus metrics, but behind a
//! trait so the concrete backend stays a pluggable collaborator.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramVec, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram, register_histogram_vec,
};

/// The abstract metrics sink every subsystem emits through. Concrete wiring
/// (Prometheus, OTLP, a test recorder, ...) is an external collaborator.
pub trait Meter: Send + Sync {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]);
    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// A `Meter` that discards everything. Used when no metrics backend is
/// configured, so call sites never need an `Option<dyn Meter>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMeter;

impl Meter for NoopMeter {
    fn incr_counter(&self, _name: &str, _labels: &[(&str, &str)]) {}
    fn observe_histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

lazy_static! {
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "meshgate_requests_total",
        "Total number of requests dispatched, labeled by matched route and status.",
        &["route_id", "status"]
    )
    .unwrap();
    pub static ref UPSTREAM_ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "meshgate_upstream_errors_total",
        "Total number of upstream errors, labeled by service and error code.",
        &["service_id", "error_code"]
    )
    .unwrap();
    pub static ref RETRIES_TOTAL: Counter = register_counter!(
        "meshgate_retries_total",
        "Total number of proxy retry attempts."
    )
    .unwrap();
    pub static ref CIRCUIT_BREAKER_OPEN_TOTAL: Counter = register_counter!(
        "meshgate_circuit_breaker_open_total",
        "Total number of times a circuit breaker tripped to Open."
    )
    .unwrap();
    pub static ref REQUEST_LATENCY_SECONDS: HistogramVec = register_histogram_vec!(
        "meshgate_request_latency_seconds",
        "End-to-end request latency in seconds, labeled by matched route.",
        &["route_id"]
    )
    .unwrap();
    pub static ref ACCESS_LOG_QUEUE_DEPTH: Gauge = register_gauge!(
        "meshgate_access_log_queue_depth",
        "Current number of access-log entries buffered in the in-memory queue."
    )
    .unwrap();
    pub static ref ACCESS_LOG_DROPPED_TOTAL: Counter = register_counter!(
        "meshgate_access_log_dropped_total",
        "Total number of access-log entries dropped due to backpressure."
    )
    .unwrap();
    pub static ref EVENT_BUS_LAG_SECONDS: Gauge = register_gauge!(
        "meshgate_event_bus_lag_seconds",
        "Seconds between the latest published event and this node's watermark."
    )
    .unwrap();
    pub static ref ALERTS_SENT_TOTAL: CounterVec = register_counter_vec!(
        "meshgate_alerts_sent_total",
        "Total number of alert sends, labeled by channel and outcome.",
        &["channel_name", "outcome"]
    )
    .unwrap();
    pub static ref COMMAND_LATENCY_SECONDS: Histogram = register_histogram!(
        "meshgate_internal_op_latency_seconds",
        "Latency of internal dispatch operations in seconds."
    )
    .unwrap();
    pub static ref TUNNEL_CURRENT_CONNECTIONS: GaugeVec = register_gauge_vec!(
        "meshgate_tunnel_current_connections",
        "Current number of open connections on a static tunnel server, labeled by server_id.",
        &["server_id"]
    )
    .unwrap();
    pub static ref TUNNEL_BYTES_RECEIVED_TOTAL: GaugeVec = register_gauge_vec!(
        "meshgate_tunnel_bytes_received_total",
        "Cumulative bytes received from tunnel clients, labeled by server_id.",
        &["server_id"]
    )
    .unwrap();
    pub static ref TUNNEL_BYTES_SENT_TOTAL: GaugeVec = register_gauge_vec!(
        "meshgate_tunnel_bytes_sent_total",
        "Cumulative bytes sent to tunnel clients, labeled by server_id.",
        &["server_id"]
    )
    .unwrap();
}

/// A `Meter` implementation backed by the process-global Prometheus
/// registry, exactly as the teacher's `core::metrics` module registers its
/// gauges/counters/histograms via `lazy_static!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMeter;

impl Meter for PrometheusMeter {
    fn incr_counter(&self, name: &str, labels: &[(&str, &str)]) {
        match (name, labels) {
            ("requests_total", [(_, route_id), (_, status)]) => {
                REQUESTS_TOTAL.with_label_values(&[route_id, status]).inc();
            }
            ("upstream_errors_total", [(_, service_id), (_, code)]) => {
                UPSTREAM_ERRORS_TOTAL
                    .with_label_values(&[service_id, code])
                    .inc();
            }
            ("retries_total", _) => RETRIES_TOTAL.inc(),
            ("circuit_breaker_open_total", _) => CIRCUIT_BREAKER_OPEN_TOTAL.inc(),
            ("access_log_dropped_total", _) => ACCESS_LOG_DROPPED_TOTAL.inc(),
            ("alerts_sent_total", [(_, channel), (_, outcome)]) => {
                ALERTS_SENT_TOTAL
                    .with_label_values(&[channel, outcome])
                    .inc();
            }
            _ => {}
        }
    }

    fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        match (name, labels) {
            ("request_latency_seconds", [(_, route_id)]) => {
                REQUEST_LATENCY_SECONDS
                    .with_label_values(&[route_id])
                    .observe(value);
            }
            _ => COMMAND_LATENCY_SECONDS.observe(value),
        }
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        match (name, labels) {
            ("access_log_queue_depth", _) => ACCESS_LOG_QUEUE_DEPTH.set(value),
            ("event_bus_lag_seconds", _) => EVENT_BUS_LAG_SECONDS.set(value),
            ("current_connection_count", [(_, server_id)]) => {
                TUNNEL_CURRENT_CONNECTIONS.with_label_values(&[server_id]).set(value);
            }
            ("total_bytes_received", [(_, server_id)]) => {
                TUNNEL_BYTES_RECEIVED_TOTAL.with_label_values(&[server_id]).set(value);
            }
            ("total_bytes_sent", [(_, server_id)]) => {
                TUNNEL_BYTES_SENT_TOTAL.with_label_values(&[server_id]).set(value);
            }
            _ => {}
        }
    }
}

/// Gathers all registered metrics and encodes them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_meter_never_panics() {
        let meter = NoopMeter;
        meter.incr_counter("anything", &[("k", "v")]);
        meter.observe_histogram("anything", 1.0, &[]);
        meter.set_gauge("anything", 2.0, &[]);
    }

    #[test]
    fn gather_metrics_is_nonempty_after_recording() {
        PrometheusMeter.incr_counter("retries_total", &[]);
        let text = gather_metrics();
        assert!(text.contains("meshgate_retries_total"));
    }
}
