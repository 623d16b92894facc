//! Markdown chat-robot webhook (DingTalk-compatible payload)

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::debug;
use url::Url;

use super::NotificationSink;
use crate::errors::DeliveryError;

#[derive(Debug, Deserialize)]
struct RobotResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

type HmacSha256 = Hmac<Sha256>;

/// `base64(HMAC-SHA256(secret, "{timestamp_ms}\n{secret}"))`, the robot's
/// secret-mode signature.
pub fn sign(secret: &str, timestamp_ms: i64) -> Result<String, DeliveryError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::Signing(e.to_string()))?;
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, http))
    }

    pub fn with_client(url: Url, http: Client) -> Self {
        Self {
            http,
            url,
            secret: None,
        }
    }

    /// Sign every request with the robot's secret. Signatures carry their own
    /// timestamp, so they are computed per request.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    fn request_url(&self) -> Result<Url, DeliveryError> {
        let mut url = self.url.clone();
        if let Some(secret) = &self.secret {
            let timestamp = Utc::now().timestamp_millis();
            let signature = sign(secret, timestamp)?;
            url.query_pairs_mut()
                .append_pair("timestamp", &timestamp.to_string())
                .append_pair("sign", &signature);
        }
        Ok(url)
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        let payload = json!({
            "msgtype": "markdown",
            "markdown": { "title": title, "text": body },
        });

        let resp = self
            .http
            .post(self.request_url()?)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        // The robot answers 200 with a non-zero errcode when it refuses a message.
        let ack: RobotResponse = resp.json().await?;
        if ack.errcode != 0 {
            return Err(DeliveryError::Rejected {
                code: ack.errcode,
                message: ack.errmsg,
            });
        }

        debug!(title = %title, "webhook notification accepted");
        Ok(())
    }
}
