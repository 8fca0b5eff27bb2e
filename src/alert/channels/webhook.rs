// src/alert/channels/webhook.rs

//! Shared HTTP sender core for webhook-shaped channels. The DingTalk,
//! WeChat Work, and QQ adapters reuse this struct, differing only in their
//! `AlertPayloadSigner` (spec.md section 4.G, resolved per the "additional
//! channel adapters" design decision).

use super::AlertChannel;
use crate::alert::template::RenderedMessage;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::time::Duration;

/// Computes whatever signature/timestamp query parameters a chat-ops
/// webhook requires, given the base URL and the raw JSON payload about to
/// be sent.
pub trait AlertPayloadSigner: Send + Sync {
    fn sign(&self, base_url: &str, payload: &[u8]) -> String;
}

/// No signing: used by plain webhook channels.
pub struct NoopSigner;

impl AlertPayloadSigner for NoopSigner {
    fn sign(&self, base_url: &str, _payload: &[u8]) -> String {
        base_url.to_string()
    }
}

/// HMAC-SHA256 query-string signer, the shape DingTalk's "sign" webhook
/// security option and similar chat-ops integrations use: `timestamp` +
/// `\n` + `secret` is HMAC-signed, base64-encoded, and appended as
/// `&timestamp=...&sign=...`.
pub struct HmacQuerySigner {
    pub secret: String,
}

impl AlertPayloadSigner for HmacQuerySigner {
    fn sign(&self, base_url: &str, _payload: &[u8]) -> String {
        let timestamp = crate::eventbus::now_millis();
        let string_to_sign = format!("{timestamp}\n{}", self.secret);
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{base_url}&timestamp={timestamp}&sign={signature}")
    }
}

pub struct WebhookChannel {
    client: Client,
    url: String,
    signer: Box<dyn AlertPayloadSigner>,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, signer: Box<dyn AlertPayloadSigner>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            signer,
        }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    async fn send(&self, message: &RenderedMessage, timeout: Duration) -> Result<String, String> {
        let payload = serde_json::json!({
            "title": message.title,
            "body": message.body,
        });
        let payload_bytes = serde_json::to_vec(&payload).map_err(|e| e.to_string())?;
        let signed_url = self.signer.sign(&self.url, &payload_bytes);

        let response = self
            .client
            .post(&signed_url)
            .timeout(timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            Ok(body)
        } else {
            Err(format!("webhook returned {status}: {body}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_signer_appends_timestamp_and_sign() {
        let signer = HmacQuerySigner {
            secret: "shh".to_string(),
        };
        let signed = signer.sign("https://example.com/hook?x=1", b"{}");
        assert!(signed.contains("&timestamp="));
        assert!(signed.contains("&sign="));
    }
}
