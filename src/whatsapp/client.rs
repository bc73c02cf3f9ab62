//! HTTP client for the WhatsApp bridge sidecar.
//!
//! The bridge (a WhatsApp Web session wrapped in a small HTTP service) owns
//! the platform session; this client only checks its status and sends text.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::WhatsAppError;

/// Default port the WhatsApp bridge listens on.
pub const DEFAULT_BRIDGE_PORT: u16 = 3001;

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for normal operations.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Number of health-check attempts before giving up.
const HEALTH_CHECK_RETRIES: u32 = 5;

/// Delay between health-check attempts in milliseconds.
const HEALTH_CHECK_DELAY_MS: u64 = 2000;

/// Client for the WhatsApp HTTP bridge.
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
    health_retries: u32,
}

/// Connection status reported by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppStatus {
    /// Whether the bridge session is connected to WhatsApp.
    pub connected: bool,
    /// Linked phone number, if connected.
    pub phone_number: Option<String>,
}

/// Payload of a successful send.
#[derive(Debug, Clone, Default, Deserialize)]
struct SentMessage {
    #[serde(default)]
    message_id: Option<String>,
}

/// Response envelope from the bridge HTTP API.
#[derive(Deserialize)]
struct BridgeResponse<T> {
    #[allow(dead_code)]
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl WhatsAppClient {
    /// Create a client pointing at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            health_retries: HEALTH_CHECK_RETRIES,
        }
    }

    /// Create a client connecting to `http://127.0.0.1:{port}`.
    pub fn with_port(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{port}"))
    }

    /// Override how many health checks [`WhatsAppClient::wait_healthy`] makes.
    #[must_use]
    pub fn with_health_retries(mut self, retries: u32) -> Self {
        self.health_retries = retries.max(1);
        self
    }

    /// Check whether the bridge is reachable and connected to WhatsApp.
    pub async fn health_check(&self) -> bool {
        match self.status().await {
            Ok(status) => status.connected,
            Err(e) => {
                debug!(error = %e, "WhatsApp bridge health check failed");
                false
            }
        }
    }

    /// Wait for the bridge to become healthy, retrying with a fixed delay.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError::NotConnected`] once retries are exhausted.
    pub async fn wait_healthy(&self) -> Result<(), WhatsAppError> {
        for attempt in 0..self.health_retries {
            if self.health_check().await {
                return Ok(());
            }
            if attempt < self.health_retries.saturating_sub(1) {
                tokio::time::sleep(std::time::Duration::from_millis(HEALTH_CHECK_DELAY_MS)).await;
            }
        }
        Err(WhatsAppError::NotConnected)
    }

    /// Get the current connection status from the bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is unreachable or answers without data.
    pub async fn status(&self) -> Result<WhatsAppStatus, WhatsAppError> {
        let url = format!("{}/status", self.base_url);
        let resp = self.client.get(&url).send().await?;
        let body: BridgeResponse<WhatsAppStatus> = resp.json().await?;
        body.data.ok_or(WhatsAppError::BridgeUnavailable)
    }

    /// Send a text message to the given JID, returning the bridge message id.
    ///
    /// # Errors
    ///
    /// Returns [`WhatsAppError::Rejected`] on a non-success status.
    pub async fn send_text(&self, jid: &str, text: &str) -> Result<Option<String>, WhatsAppError> {
        let url = format!("{}/send", self.base_url);
        let body = serde_json::json!({ "jid": jid, "text": text });
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<BridgeResponse<serde_json::Value>>(&body_text)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or(body_text);
            warn!(%status, jid, "WhatsApp send failed: {message}");
            return Err(WhatsAppError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let sent = resp
            .json::<BridgeResponse<SentMessage>>()
            .await
            .ok()
            .and_then(|b| b.data)
            .unwrap_or_default();
        debug!(jid, "message sent via WhatsApp");
        Ok(sent.message_id)
    }

    /// Send a typing indicator (composing) to the given JID.
    ///
    /// Fire-and-forget: typing indicators never block delivery.
    pub async fn send_typing(&self, jid: &str) {
        let url = format!("{}/typing", self.base_url);
        let body = serde_json::json!({ "jid": jid });
        if let Err(e) = self.client.post(&url).json(&body).send().await {
            debug!(error = %e, jid, "failed to send WhatsApp typing indicator");
        }
    }

    /// Returns the base URL of the bridge.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
