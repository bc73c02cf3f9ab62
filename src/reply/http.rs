//! Hosted chat API client.
//!
//! Posts [`ChatRequest`]s to `{base_url}/v1/bot/chat` with a bearer API key.
//! The project id is merged into every request body.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ChatEnvelope, ChatRequest, ReplyService, ReplyServiceError};
use crate::error::ChannelError;

/// Default hosted API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.boostgpt.co";

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of body characters kept in a status error.
const MAX_ERROR_BODY_LEN: usize = 512;

/// Reply service backed by the hosted chat HTTP API.
pub struct HttpReplyService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    project_id: String,
}

impl std::fmt::Debug for HttpReplyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReplyService")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl HttpReplyService {
    /// Create a client for the given endpoint and project.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] when the API key or project id
    /// is empty.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let api_key = api_key.into();
        let project_id = project_id.into();
        if api_key.trim().is_empty() {
            return Err(ChannelError::configuration("reply service api key is required"));
        }
        if project_id.trim().is_empty() {
            return Err(ChannelError::configuration("project id is required"));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            project_id,
        })
    }

    /// Returns the base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ReplyService for HttpReplyService {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatEnvelope, ReplyServiceError> {
        let url = format!("{}/v1/bot/chat", self.base_url);

        let mut body = serde_json::to_value(request)
            .map_err(|e| ReplyServiceError::Unavailable(format!("request encoding: {e}")))?;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "project_id".to_owned(),
                serde_json::Value::String(self.project_id.clone()),
            );
        }

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_LEN)
                .collect();
            warn!(%status, chat_id = %request.chat_id, "reply service returned error status");
            return Err(ReplyServiceError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let bytes = resp.bytes().await?;
        let envelope: ChatEnvelope = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(chat_id = %request.chat_id, error = %e, "reply service body did not decode");
            ReplyServiceError::Malformed(e.to_string())
        })?;
        debug!(chat_id = %request.chat_id, "reply service responded");
        Ok(envelope)
    }

    fn project_id(&self) -> Option<&str> {
        Some(&self.project_id)
    }
}
