// src/alert/channels/mod.rs

//! Channel adapters. Email/SMS gateways require concrete provider
//! credentials outside this system's scope, so only a stub is provided;
//! webhook and the chat-ops channels (DingTalk/WeChat Work/QQ) share one
//! HTTP sender core and differ only in how they sign/shape the payload.

mod dingtalk;
mod email;
mod qq;
mod wechat_work;
mod webhook;

pub use dingtalk::DingTalkChannel;
pub use email::EmailChannel;
pub use qq::QqChannel;
pub use wechat_work::WechatWorkChannel;
pub use webhook::{AlertPayloadSigner, NoopSigner, WebhookChannel};

use crate::alert::template::RenderedMessage;
use async_trait::async_trait;
use std::time::Duration;

/// A configured destination an alert can be sent to. `channelName` in
/// `AlertConfig` resolves to one live instance, kept hot by the
/// `ChannelManager` (spec.md section 4.G "Channel manager").
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send(&self, message: &RenderedMessage, timeout: Duration) -> Result<String, String>;
}
