// src/model/alert.rs

//! Alert-dispatcher entities: channel configuration, message templates, and
//! the send log (spec.md section 3 / section 4.G).

use super::audit::AuditFields;
use serde::{Deserialize, Serialize};

pub const TABLE_CONFIG: &str = "HUB_ALERT_CONFIG";
pub const TABLE_TEMPLATE: &str = "HUB_ALERT_TEMPLATE";
pub const TABLE_LOG: &str = "HUB_ALERT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannelType {
    Email,
    Sms,
    Webhook,
    DingTalk,
    WechatWork,
    Qq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayFormat {
    Text,
    Html,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSendStatus {
    Pending,
    Sending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub channel_name: String,
    pub channel_type: AlertChannelType,
    /// Channel-specific endpoint/credential configuration (webhook URL,
    /// SMTP host, signing secret, ...).
    pub server_config: serde_json::Value,
    /// Retry/backoff/rate-limit tuning for this channel.
    pub max_retry_count: u32,
    pub retry_interval_ms: u64,
    pub rate_limit_per_minute: u32,
    pub enabled: bool,
    /// Rolling counters, updated by the send worker after every attempt.
    pub total_sent: u64,
    pub total_failed: u64,
    pub last_send_time: Option<i64>,
    pub last_success_time: Option<i64>,
    pub last_failure_time: Option<i64>,
    /// Exponential moving average of send duration in milliseconds
    /// (alpha = 0.1), tracked the way the teacher tracks rolling latency
    /// stats rather than a plain running mean.
    pub avg_duration_millis: f64,
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTemplate {
    pub template_id: String,
    pub title: String,
    /// Body with `{{placeholder}}` tokens substituted at render time.
    pub body: String,
    pub display_format: DisplayFormat,
    pub audit: AuditFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertLog {
    pub alert_log_id: String,
    pub channel_name: String,
    pub level: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub extra: serde_json::Value,
    pub send_status: AlertSendStatus,
    pub send_attempts: u32,
    pub send_time: Option<i64>,
    pub send_result: Option<String>,
    pub error: Option<String>,
    pub add_time: i64,
}

impl AlertLog {
    /// Valid forward transitions: PENDING -> SENDING -> {SUCCESS, FAILED}.
    /// SUCCESS and FAILED are both terminal. No other transition is legal.
    pub fn can_transition_to(&self, next: AlertSendStatus) -> bool {
        use AlertSendStatus::*;
        matches!((self.send_status, next), (Pending, Sending) | (Sending, Success) | (Sending, Failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_status(status: AlertSendStatus) -> AlertLog {
        AlertLog {
            alert_log_id: "a1".to_string(),
            channel_name: "ops-webhook".to_string(),
            level: "critical".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            tags: vec![],
            extra: serde_json::Value::Null,
            send_status: status,
            send_attempts: 0,
            send_time: None,
            send_result: None,
            error: None,
            add_time: 0,
        }
    }

    #[test]
    fn pending_can_only_move_to_sending() {
        let log = log_with_status(AlertSendStatus::Pending);
        assert!(log.can_transition_to(AlertSendStatus::Sending));
        assert!(!log.can_transition_to(AlertSendStatus::Success));
        assert!(!log.can_transition_to(AlertSendStatus::Failed));
    }

    #[test]
    fn failed_is_terminal() {
        let log = log_with_status(AlertSendStatus::Failed);
        assert!(!log.can_transition_to(AlertSendStatus::Sending));
        assert!(!log.can_transition_to(AlertSendStatus::Success));
    }

    #[test]
    fn success_is_terminal() {
        let log = log_with_status(AlertSendStatus::Success);
        assert!(!log.can_transition_to(AlertSendStatus::Sending));
        assert!(!log.can_transition_to(AlertSendStatus::Failed));
    }
}
