// src/alert/manager.rs

//! Builds and keeps hot a live `AlertChannel` per configured channel name
//! (spec.md section 4.G "Channel manager"). Swapped atomically on
//! `AlertConfigChanged` events, mirroring the router's
//! `RwLock<Arc<RouteTable>>` hot-reload pattern.

use super::channels::{AlertChannel, DingTalkChannel, EmailChannel, QqChannel, WechatWorkChannel, WebhookChannel, NoopSigner};
use crate::model::{AlertChannelType, AlertConfig};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

pub struct ChannelManager {
    channels: DashMap<String, Arc<dyn AlertChannel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    pub fn from_configs(configs: &[AlertConfig]) -> Self {
        let manager = Self::new();
        for config in configs {
            manager.upsert(config);
        }
        manager
    }

    /// Builds a channel adapter from `config.server_config` and installs it
    /// under `config.channel_name`, replacing any previous instance.
    pub fn upsert(&self, config: &AlertConfig) {
        match build_channel(config) {
            Ok(channel) => {
                self.channels.insert(config.channel_name.clone(), channel);
            }
            Err(e) => {
                warn!("could not build alert channel '{}': {}", config.channel_name, e);
                self.channels.remove(&config.channel_name);
            }
        }
    }

    pub fn remove(&self, channel_name: &str) {
        self.channels.remove(channel_name);
    }

    pub fn get(&self, channel_name: &str) -> Option<Arc<dyn AlertChannel>> {
        self.channels.get(channel_name).map(|entry| entry.value().clone())
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn build_channel(config: &AlertConfig) -> Result<Arc<dyn AlertChannel>, String> {
    let cfg = &config.server_config;
    let url = || cfg.get("url").and_then(|v| v.as_str()).ok_or_else(|| "missing 'url'".to_string());
    let secret = || cfg.get("secret").and_then(|v| v.as_str()).unwrap_or("").to_string();

    let channel: Arc<dyn AlertChannel> = match config.channel_type {
        AlertChannelType::Webhook => Arc::new(WebhookChannel::new(url()?, Box::new(NoopSigner))),
        AlertChannelType::DingTalk => Arc::new(DingTalkChannel::new(url()?, secret())),
        AlertChannelType::WechatWork => Arc::new(WechatWorkChannel::new(url()?)),
        AlertChannelType::Qq => Arc::new(QqChannel::new(url()?, secret())),
        AlertChannelType::Email => {
            let recipient = cfg.get("recipient").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Arc::new(EmailChannel::new(recipient))
        }
        AlertChannelType::Sms => return Err("sms channel type has no adapter".to_string()),
    };
    Ok(channel)
}
