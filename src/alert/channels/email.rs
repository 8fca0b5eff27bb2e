// src/alert/channels/email.rs

use super::AlertChannel;
use crate::alert::template::RenderedMessage;
use async_trait::async_trait;
use std::time::Duration;

/// Email delivery requires a concrete SMTP provider and credentials, which
/// are out of scope here. `EmailChannel` records the intended recipient and
/// fails sends explicitly rather than pretending to deliver, so callers see
/// a clean FAILED log entry instead of a silent no-op.
pub struct EmailChannel {
    pub recipient: String,
}

impl EmailChannel {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self { recipient: recipient.into() }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    async fn send(&self, _message: &RenderedMessage, _timeout: Duration) -> Result<String, String> {
        Err(format!(
            "email channel not configured with an SMTP provider (recipient: {})",
            self.recipient
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_fails_explicitly() {
        let channel = EmailChannel::new("ops@example.com");
        let message = RenderedMessage { title: "t".into(), body: "b".into() };
        let result = channel.send(&message, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
