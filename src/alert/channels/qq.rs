// src/alert/channels/qq.rs

use super::webhook::{HmacQuerySigner, WebhookChannel};
use super::AlertChannel;
use crate::alert::template::RenderedMessage;
use async_trait::async_trait;
use std::time::Duration;

/// A QQ group robot webhook, signed the same way as DingTalk's.
pub struct QqChannel {
    inner: WebhookChannel,
}

impl QqChannel {
    pub fn new(webhook_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            inner: WebhookChannel::new(
                webhook_url,
                Box::new(HmacQuerySigner { secret: secret.into() }),
            ),
        }
    }
}

#[async_trait]
impl AlertChannel for QqChannel {
    async fn send(&self, message: &RenderedMessage, timeout: Duration) -> Result<String, String> {
        self.inner.send(message, timeout).await
    }
}
