//! SMS gateway seam and the Arkesel client.

use crate::constants::{SMS_BATCH_PAUSE_MS, SMS_BATCH_SIZE, SMS_STATUS_URL, SMS_TIMEOUT_SECS};
use async_trait::async_trait;
use opsflow_core::{GatewayError, OpsResult};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway name reported in configuration errors.
const GATEWAY: &str = "SMS service";

#[async_trait]
pub trait SmsGateway: Send + Sync + 'static {
    fn is_configured(&self) -> bool;

    /// Deliver `message` to every recipient. Returns the provider's id for the
    /// first message, when it reports one.
    async fn send(&self, recipients: &[String], message: &str) -> OpsResult<Option<String>>;

    /// Raw delivery report for `message_id`.
    async fn status(&self, message_id: &str) -> OpsResult<serde_json::Value>;
}

#[derive(Debug, Serialize)]
struct SendBody<'a> {
    sender: &'a str,
    message: &'a str,
    recipients: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SendReply {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<DeliveredTo>,
}

#[derive(Debug, Deserialize)]
struct DeliveredTo {
    #[serde(default)]
    id: Option<String>,
}

impl SendReply {
    fn check(self, gateway: &str) -> Result<Option<String>, GatewayError> {
        if !self.status.eq_ignore_ascii_case("success") {
            return Err(GatewayError::RequestFailed {
                gateway: gateway.to_string(),
                status: 200,
                message: self.message.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        Ok(self.data.into_iter().find_map(|d| d.id))
    }
}

/// Arkesel v2 client. Large sends go out in chunks of [`SMS_BATCH_SIZE`]
/// with a short pause between them; the first failing chunk aborts the send.
#[derive(Debug, Clone)]
pub struct ArkeselGateway {
    client: Client,
    send_url: String,
    status_url: String,
    api_key: Option<SecretString>,
    sender_id: String,
}

impl ArkeselGateway {
    pub fn new(
        send_url: impl Into<String>,
        api_key: Option<SecretString>,
        sender_id: impl Into<String>,
    ) -> OpsResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SMS_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::InvalidResponse {
                gateway: GATEWAY.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            send_url: send_url.into(),
            status_url: SMS_STATUS_URL.to_string(),
            api_key,
            sender_id: sender_id.into(),
        })
    }

    fn api_key(&self) -> Result<&str, GatewayError> {
        match &self.api_key {
            Some(key) if !self.sender_id.is_empty() => Ok(key.expose_secret()),
            _ => {
                tracing::error!("Arkesel API key or sender id is not configured");
                Err(GatewayError::NotConfigured {
                    gateway: GATEWAY.to_string(),
                })
            }
        }
    }

    fn transport(e: reqwest::Error) -> GatewayError {
        tracing::error!(error = %e, "Failed to reach SMS provider");
        GatewayError::RequestFailed {
            gateway: GATEWAY.to_string(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: "Failed to communicate with SMS provider.".to_string(),
        }
    }

    async fn send_chunk(&self, key: &str, chunk: &[String], message: &str) -> OpsResult<Option<String>> {
        let response = self
            .client
            .post(&self.send_url)
            .header("api-key", key)
            .json(&SendBody {
                sender: &self.sender_id,
                message,
                recipients: chunk,
            })
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::RequestFailed {
                gateway: GATEWAY.to_string(),
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        let reply: SendReply = response.json().await.map_err(|e| GatewayError::InvalidResponse {
            gateway: GATEWAY.to_string(),
            reason: e.to_string(),
        })?;
        Ok(reply.check(GATEWAY)?)
    }
}

#[async_trait]
impl SmsGateway for ArkeselGateway {
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.sender_id.is_empty()
    }

    async fn send(&self, recipients: &[String], message: &str) -> OpsResult<Option<String>> {
        let key = self.api_key()?;
        let chunks: Vec<&[String]> = recipients.chunks(SMS_BATCH_SIZE).collect();
        let mut first_id = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let id = self.send_chunk(key, chunk, message).await?;
            tracing::info!(batch = i + 1, recipients = chunk.len(), "SMS batch sent");
            first_id = first_id.or(id);
            if i + 1 < chunks.len() {
                tokio::time::sleep(Duration::from_millis(SMS_BATCH_PAUSE_MS)).await;
            }
        }

        tracing::info!(
            batches = chunks.len(),
            recipients = recipients.len(),
            "All SMS batches sent"
        );
        Ok(first_id)
    }

    async fn status(&self, message_id: &str) -> OpsResult<serde_json::Value> {
        let key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or_else(|| GatewayError::NotConfigured {
                gateway: GATEWAY.to_string(),
            })?;

        let response = self
            .client
            .get(format!("{}/{}", self.status_url, message_id))
            .header("api-key", key)
            .send()
            .await
            .map_err(Self::transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), %message_id, "SMS status check failed");
            return Err(GatewayError::RequestFailed {
                gateway: GATEWAY.to_string(),
                status: status.as_u16(),
                message: format!("status check returned {}", status.as_u16()),
            }
            .into());
        }

        tracing::info!(%message_id, "Checked SMS status");
        Ok(response.json().await.map_err(|e| GatewayError::InvalidResponse {
            gateway: GATEWAY.to_string(),
            reason: e.to_string(),
        })?)
    }
}
