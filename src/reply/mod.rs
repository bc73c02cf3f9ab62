//! Reply service abstraction.
//!
//! Defines the [`ReplyService`] trait the router and adapters call to turn a
//! normalized message into a reply, plus the request/response envelope shapes
//! of the hosted chat API.
//!
//! - [`http::HttpReplyService`]: `reqwest` client for the hosted API
//! - [`retry::RetryPolicy`]: exponential backoff used by the default reply path

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;
pub mod retry;

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A chat request sent to the reply service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Bot that should answer.
    pub bot_id: String,
    /// Model override for this bot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider key forwarded to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_key: Option<String>,
    /// User message content.
    pub message: String,
    /// Knowledge sources to restrict retrieval to.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub source_ids: Vec<String>,
    /// Tags to restrict retrieval to.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
    /// Number of retrieved chunks to consider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u32>,
    /// Upper bound on reply length in tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reply_tokens: Option<u32>,
    /// Conversation identifier, stable per channel and user.
    pub chat_id: String,
    /// Originating channel name.
    pub channel: String,
    /// Always `false`: the router needs a complete reply.
    pub stream: bool,
}

/// Response envelope returned by the reply service.
///
/// Exactly one of `err` or `response` is expected; anything else is malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatEnvelope {
    /// Service-reported failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<serde_json::Value>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ChatResponse>,
}

/// Success payload of a [`ChatEnvelope`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Chat section carrying the reply.
    #[serde(default)]
    pub chat: Option<ChatReply>,
}

/// The reply itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Reply text.
    #[serde(default)]
    pub reply: Option<String>,
}

impl ChatEnvelope {
    /// Build a success envelope carrying `reply`.
    pub fn reply(reply: impl Into<String>) -> Self {
        Self {
            err: None,
            response: Some(ChatResponse {
                chat: Some(ChatReply {
                    reply: Some(reply.into()),
                }),
            }),
        }
    }

    /// Build a failure envelope carrying `err`.
    pub fn error(err: impl Into<serde_json::Value>) -> Self {
        Self {
            err: Some(err.into()),
            response: None,
        }
    }

    /// The service-reported error, if any. A JSON `null` counts as absent.
    pub fn service_error(&self) -> Option<&serde_json::Value> {
        self.err.as_ref().filter(|e| !e.is_null())
    }

    /// The reply text when the envelope has the expected success shape.
    pub fn reply_text(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| r.chat.as_ref())
            .and_then(|c| c.reply.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures talking to the reply service.
#[derive(Debug, thiserror::Error)]
pub enum ReplyServiceError {
    /// HTTP transport error.
    #[error("reply service transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("reply service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The service answered with an `err` field.
    #[error("reply service error: {0}")]
    Rejected(String),

    /// Any other transport failure (used by non-HTTP implementations).
    #[error("reply service unavailable: {0}")]
    Unavailable(String),

    /// A success status whose body does not decode as an envelope.
    #[error("reply service sent a malformed body: {0}")]
    Malformed(String),
}

impl ReplyServiceError {
    /// Whether another attempt could succeed. A malformed body will not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Opaque request/response backend producing replies.
#[async_trait]
pub trait ReplyService: Send + Sync {
    /// Request a reply for one message.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure. Service-level failures may be
    /// reported either as an error or through [`ChatEnvelope::err`].
    async fn chat(&self, request: &ChatRequest) -> Result<ChatEnvelope, ReplyServiceError>;

    /// Project the service is scoped to, reported in router status.
    fn project_id(&self) -> Option<&str> {
        None
    }
}

/// Per-call overrides for the default reply path.
///
/// Unset fields fall back to the adapter's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyOptions {
    /// Model override.
    pub model: Option<String>,
    /// Provider key override.
    pub provider_key: Option<String>,
    /// Source filter override.
    pub source_ids: Option<Vec<String>>,
    /// Tag filter override.
    pub tags: Option<Vec<String>>,
    /// Retrieval depth override.
    pub top: Option<u32>,
    /// Reply token limit override.
    pub max_reply_tokens: Option<u32>,
}

/// Conversation identifier for a user on a channel.
///
/// Deterministic so the service keys conversation memory consistently.
pub fn conversation_id(channel_name: &str, user_id: &str) -> String {
    format!("{channel_name}-{user_id}")
}
