// src/config.rs

//! Process-wide gateway configuration: loading from TOML, defaulting, and
//! validation. Mirrors the staged `RawConfig -> GatewayConfig` resolution
//! pattern used throughout this codebase's teacher lineage: every field has
//! an explicit default function so a near-empty config file is still usable.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Top-level listener binding for one gateway node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub tls_cert_path: Option<String>,
    #[serde(default)]
    pub tls_key_path: Option<String>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls_enabled: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

/// Timeouts independently enforced per spec.md section 5; the tightest wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_read_timeout_ms() -> u64 {
    30_000
}
fn default_write_timeout_ms() -> u64 {
    30_000
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

/// Retry behavior for upstream proxy calls (spec.md section 4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_retry_count() -> u32 {
    2
}
fn default_retry_interval_ms() -> u64 {
    50
}
fn default_retry_max_delay_ms() -> u64 {
    2_000
}

/// Access-log pipeline settings (spec.md section 4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPipelineConfig {
    #[serde(default = "default_log_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_log_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_log_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_log_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for LogPipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_log_channel_capacity(),
            batch_size: default_log_batch_size(),
            flush_interval_ms: default_log_flush_interval_ms(),
            retention_hours: default_log_retention_hours(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

fn default_log_channel_capacity() -> usize {
    10_000
}
fn default_log_batch_size() -> usize {
    100
}
fn default_log_flush_interval_ms() -> u64 {
    1_000
}
fn default_log_retention_hours() -> u64 {
    720
}
fn default_cleanup_interval_ms() -> u64 {
    3_600_000
}

/// Cluster event-bus poll/replay/retention parameters (spec.md section 4.B).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    #[serde(default = "default_event_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_event_batch")]
    pub batch: usize,
    #[serde(default = "default_event_replay_window_hours")]
    pub replay_window_hours: u64,
    #[serde(default = "default_event_retention_hours")]
    pub retention_hours: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_event_poll_interval_ms(),
            batch: default_event_batch(),
            replay_window_hours: default_event_replay_window_hours(),
            retention_hours: default_event_retention_hours(),
        }
    }
}

fn default_event_poll_interval_ms() -> u64 {
    5_000
}
fn default_event_batch() -> usize {
    100
}
fn default_event_replay_window_hours() -> u64 {
    24
}
fn default_event_retention_hours() -> u64 {
    72
}

/// Alert dispatcher poll/batch settings (spec.md section 4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_alert_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_alert_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_alert_retention_hours")]
    pub retention_hours: u64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_alert_poll_interval_ms(),
            batch_size: default_alert_batch_size(),
            flush_interval_ms: default_alert_flush_interval_ms(),
            retention_hours: default_alert_retention_hours(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

fn default_alert_poll_interval_ms() -> u64 {
    5_000
}
fn default_alert_batch_size() -> usize {
    50
}
fn default_alert_flush_interval_ms() -> u64 {
    1_000
}
fn default_alert_retention_hours() -> u64 {
    168
}

/// Filter-chain guards (spec.md section 4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_filter_chain_depth")]
    pub max_filter_chain_depth: usize,
    #[serde(default = "default_trie_threshold")]
    pub trie_threshold: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_filter_chain_depth: default_max_filter_chain_depth(),
            trie_threshold: default_trie_threshold(),
        }
    }
}

fn default_max_filter_chain_depth() -> usize {
    32
}
fn default_trie_threshold() -> usize {
    100
}

/// Process-wide supervisor / shutdown settings (spec.md section 4.I).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Prometheus metrics exporter, mirroring the teacher's own `MetricsConfig`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_node_id() -> String {
    format!("node-{}", uuid::Uuid::new_v4())
}
fn default_tenant_id() -> String {
    "default".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_connections() -> usize {
    10_000
}

/// A raw representation of the config file before defaulting/validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_node_id")]
    node_id: String,
    #[serde(default = "default_tenant_id")]
    tenant_id: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_connections")]
    max_connections: usize,
    #[serde(default)]
    listener: ListenerConfig,
    #[serde(default)]
    timeouts: TimeoutConfig,
    #[serde(default)]
    retry: RetryConfig,
    #[serde(default)]
    log_pipeline: LogPipelineConfig,
    #[serde(default)]
    event_bus: EventBusConfig,
    #[serde(default)]
    alert: AlertConfig,
    #[serde(default)]
    router: RouterConfig,
    #[serde(default)]
    supervisor: SupervisorConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

/// The final, validated, resolved server configuration (spec.md section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub node_id: String,
    pub tenant_id: String,
    pub log_level: String,
    pub max_connections: usize,
    pub listener: ListenerConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub log_pipeline: LogPipelineConfig,
    pub event_bus: EventBusConfig,
    pub alert: AlertConfig,
    pub router: RouterConfig,
    pub supervisor: SupervisorConfig,
    pub metrics: MetricsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            tenant_id: default_tenant_id(),
            log_level: default_log_level(),
            max_connections: default_max_connections(),
            listener: ListenerConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            log_pipeline: LogPipelineConfig::default(),
            event_bus: EventBusConfig::default(),
            alert: AlertConfig::default(),
            router: RouterConfig::default(),
            supervisor: SupervisorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Loads and validates configuration from a TOML file on disk.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from an in-memory TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(contents).with_context(|| "failed to parse TOML configuration")?;

        let config = GatewayConfig {
            node_id: raw.node_id,
            tenant_id: raw.tenant_id,
            log_level: raw.log_level,
            max_connections: raw.max_connections,
            listener: raw.listener,
            timeouts: raw.timeouts,
            retry: raw.retry,
            log_pipeline: raw.log_pipeline,
            event_bus: raw.event_bus,
            alert: raw.alert,
            router: raw.router,
            supervisor: raw.supervisor,
            metrics: raw.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration for logical consistency.
    fn validate(&self) -> Result<()> {
        if self.listener.port == 0 {
            return Err(anyhow!("listener.port cannot be 0"));
        }
        if self.node_id.trim().is_empty() {
            return Err(anyhow!("node_id cannot be empty"));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(anyhow!("tenant_id cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(anyhow!("max_connections cannot be 0"));
        }
        if self.log_pipeline.batch_size == 0 {
            return Err(anyhow!("log_pipeline.batch_size cannot be 0"));
        }
        if self.log_pipeline.channel_capacity == 0 {
            return Err(anyhow!("log_pipeline.channel_capacity cannot be 0"));
        }
        if self.event_bus.batch == 0 {
            return Err(anyhow!("event_bus.batch cannot be 0"));
        }
        if self.router.max_filter_chain_depth == 0 {
            return Err(anyhow!("router.max_filter_chain_depth cannot be 0"));
        }
        if self.listener.tls_enabled {
            if self.listener.tls_cert_path.as_deref().unwrap_or("").is_empty() {
                return Err(anyhow!(
                    "listener.tls_cert_path is required when tls_enabled"
                ));
            }
            if self.listener.tls_key_path.as_deref().unwrap_or("").is_empty() {
                return Err(anyhow!(
                    "listener.tls_key_path is required when tls_enabled"
                ));
            }
        }
        if self.metrics.enabled && self.metrics.port == self.listener.port {
            return Err(anyhow!(
                "metrics.port cannot be the same as the main listener port"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_resolves_all_defaults() {
        let config = GatewayConfig::from_toml_str("").expect("empty config should parse");
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.retry.retry_count, 2);
    }

    #[test]
    fn zero_port_rejected() {
        let err = GatewayConfig::from_toml_str("[listener]\nport = 0\n").unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn tls_without_cert_rejected() {
        let toml = "[listener]\ntls_enabled = true\n";
        let err = GatewayConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("tls_cert_path"));
    }

    #[test]
    fn metrics_port_collision_rejected() {
        let toml = "[listener]\nport = 8080\n[metrics]\nenabled = true\nport = 8080\n";
        let err = GatewayConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("metrics.port"));
    }
}
