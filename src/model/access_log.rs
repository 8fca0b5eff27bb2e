// src/model/access_log.rs

//! `AccessLog` — one row per proxied request, written by the access-log
//! pipeline (spec.md section 3 / section 4.F).

use serde::{Deserialize, Serialize};

pub const TABLE: &str = "HUB_GW_ACCESS_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLog {
    pub access_log_id: String,
    pub tenant_id: String,
    pub gateway_instance_id: String,
    pub route_id: Option<String>,
    pub service_id: Option<String>,
    pub upstream_instance_id: Option<String>,
    pub trace_id: String,

    pub client_ip: String,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub protocol: String,

    pub request_headers_size: u64,
    pub request_body_size: u64,
    pub response_headers_size: u64,
    pub response_body_size: u64,

    pub upstream_status: Option<u16>,
    pub gateway_status: u16,
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub matched_filter_ids: Vec<String>,
    pub retry_count: u32,

    /// Epoch millis the gateway accepted the request.
    pub received_at: i64,
    /// Epoch millis proxying started (after filter chain / routing).
    pub proxy_start_at: Option<i64>,
    /// Epoch millis the first upstream byte arrived.
    pub backend_start_at: Option<i64>,
    /// Epoch millis the last upstream byte arrived.
    pub backend_recv_at: Option<i64>,
    /// Epoch millis the response was fully sent to the client.
    pub response_sent_at: Option<i64>,
    /// Epoch millis the request was fully finished (success or error).
    pub finished_at: i64,

    pub add_time: i64,
}

impl AccessLog {
    /// Total wall-clock duration of the request in milliseconds.
    pub fn total_duration_ms(&self) -> i64 {
        self.finished_at - self.received_at
    }

    /// Duration spent waiting on the upstream, if proxying was attempted.
    pub fn upstream_duration_ms(&self) -> Option<i64> {
        match (self.backend_start_at, self.backend_recv_at) {
            (Some(start), Some(recv)) => Some(recv - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AccessLog {
        AccessLog {
            access_log_id: "al1".to_string(),
            tenant_id: "t1".to_string(),
            gateway_instance_id: "gw1".to_string(),
            route_id: Some("r1".to_string()),
            service_id: Some("svc1".to_string()),
            upstream_instance_id: Some("inst1".to_string()),
            trace_id: "trace1".to_string(),
            client_ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            path: "/api/foo".to_string(),
            query: None,
            protocol: "HTTP/1.1".to_string(),
            request_headers_size: 100,
            request_body_size: 0,
            response_headers_size: 200,
            response_body_size: 512,
            upstream_status: Some(200),
            gateway_status: 200,
            error_code: None,
            error_message: None,
            matched_filter_ids: vec![],
            retry_count: 0,
            received_at: 1_000,
            proxy_start_at: Some(1_005),
            backend_start_at: Some(1_010),
            backend_recv_at: Some(1_040),
            response_sent_at: Some(1_045),
            finished_at: 1_050,
            add_time: 1_050,
        }
    }

    #[test]
    fn total_duration_is_finished_minus_received() {
        assert_eq!(sample().total_duration_ms(), 50);
    }

    #[test]
    fn upstream_duration_none_without_backend_timestamps() {
        let mut log = sample();
        log.backend_recv_at = None;
        assert_eq!(log.upstream_duration_ms(), None);
    }
}
