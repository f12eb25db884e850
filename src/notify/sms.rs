//! HTTP SMS gateway client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DeliveryResult, SmsTransport};
use crate::error::{Error, Result};

// ---

#[derive(Debug, Clone)]
pub struct SmsSettings {
    // ---
    /// Gateway endpoint accepting a JSON send request.
    pub api_url: String,
    pub api_key: String,
    /// Registered sender number.
    pub sender: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    to: &'a str,
    from: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct SendResponse {
    #[serde(default)]
    message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSmsTransport {
    client: reqwest::Client,
    settings: SmsSettings,
}

impl HttpSmsTransport {
    // ---
    pub fn new(settings: SmsSettings) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("codemetal-alertflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(HttpSmsTransport { client, settings })
    }

    async fn post(&self, phone_number: &str, message: &str) -> Result<DeliveryResult> {
        // ---
        let body = SendRequest {
            kind: "SMS",
            to: phone_number,
            from: &self.settings.sender,
            text: message,
        };

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("request to {} failed: {}", phone_number, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "gateway returned {} for {}: {}",
                status, phone_number, detail
            )));
        }

        // A 2xx with an unreadable body still means the gateway accepted it.
        let parsed: SendResponse = response.json().await.unwrap_or_default();
        Ok(DeliveryResult {
            message_id: parsed.message_id,
        })
    }
}

#[async_trait]
impl SmsTransport for HttpSmsTransport {
    async fn send(&self, phone_number: &str, message: &str) -> Result<DeliveryResult> {
        // ---
        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, self.post(phone_number, message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(format!(
                "send to {} timed out after {}ms",
                phone_number,
                timeout.as_millis()
            ))),
        }
    }
}
