// src/alert/channels/wechat_work.rs

use super::webhook::{NoopSigner, WebhookChannel};
use super::AlertChannel;
use crate::alert::template::RenderedMessage;
use async_trait::async_trait;
use std::time::Duration;

/// A WeChat Work (Qiye Weixin) group robot webhook. The robot key is baked
/// into the webhook URL itself, so no extra signing is required.
pub struct WechatWorkChannel {
    inner: WebhookChannel,
}

impl WechatWorkChannel {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            inner: WebhookChannel::new(webhook_url, Box::new(NoopSigner)),
        }
    }
}

#[async_trait]
impl AlertChannel for WechatWorkChannel {
    async fn send(&self, message: &RenderedMessage, timeout: Duration) -> Result<String, String> {
        self.inner.send(message, timeout).await
    }
}
