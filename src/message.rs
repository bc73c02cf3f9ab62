//! Channel-agnostic message, context and status shapes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::AdapterCore;
use crate::reply::ReplyService;
use crate::router::Router;

/// Free-form channel-specific fields.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// An inbound message normalized from a platform event.
///
/// Built fresh per event and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Message text. Never empty once it reaches a handler.
    pub content: String,
    /// Sender identity, stable within one channel.
    pub user_id: String,
    /// Display label; falls back to `user_id`.
    pub user_name: String,
    /// Channel-specific context (ids, flags). Opaque to the router.
    #[serde(default)]
    pub metadata: Metadata,
}

impl NormalizedMessage {
    /// Build a message, returning `None` for empty or whitespace-only content.
    ///
    /// A missing or blank `user_name` falls back to `user_id`.
    pub fn new(
        content: impl Into<String>,
        user_id: impl Into<String>,
        user_name: Option<String>,
        metadata: Metadata,
    ) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        let user_id = user_id.into();
        let user_name = user_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| user_id.clone());
        Some(Self {
            content,
            user_id,
            user_name,
            metadata,
        })
    }
}

/// Context passed alongside a [`NormalizedMessage`] through the handler chain.
///
/// The adapter fills `channel`, `adapter` and `extras`; the router adds
/// `router` and `reply_service` before calling the caller's handler.
#[derive(Clone)]
pub struct MessageContext {
    /// Originating channel name.
    pub channel: String,
    /// Base state of the adapter that received the message.
    pub adapter: Arc<AdapterCore>,
    /// Router the adapter is registered with, when dispatched via a router.
    pub router: Option<Router>,
    /// Reply service the router was built with.
    pub reply_service: Option<Arc<dyn ReplyService>>,
    /// Adapter-supplied extras (raw ids, thread markers).
    pub extras: Metadata,
}

impl std::fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageContext")
            .field("channel", &self.channel)
            .field("routed", &self.router.is_some())
            .field("extras", &self.extras)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Results and status
// ---------------------------------------------------------------------------

/// Outcome of an out-of-band send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    /// Channel the message went out on.
    pub channel: String,
    /// Recipient as given by the caller.
    pub recipient: String,
    /// Platform message id, when the platform returns one.
    pub message_id: Option<String>,
    /// When the platform accepted the message.
    pub sent_at: DateTime<Utc>,
}

impl SendResult {
    /// Record a send accepted now.
    pub fn accepted(
        channel: impl Into<String>,
        recipient: impl Into<String>,
        message_id: Option<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            recipient: recipient.into(),
            message_id,
            sent_at: Utc::now(),
        }
    }
}

/// Snapshot of one adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterStatus {
    /// Channel name.
    pub channel: String,
    /// Whether the adapter is receiving events.
    pub is_started: bool,
    /// Bot the adapter asks replies from.
    pub bot_id: Option<String>,
    /// Default model.
    pub model: Option<String>,
    /// Channel-specific fields.
    #[serde(flatten)]
    pub extra: Metadata,
}

/// Snapshot of the router and every registered adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStatus {
    /// Whether the router reached the started state.
    pub is_started: bool,
    /// Adapter snapshots in registration order.
    pub adapters: Vec<AdapterStatus>,
    /// Project of the reply service.
    pub project_id: Option<String>,
    /// Bot id injected into adapters that have none.
    pub default_bot_id: Option<String>,
}

/// Per-adapter outcome of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    /// Targeted channel.
    pub channel: String,
    /// Whether the adapter broadcast the message.
    pub success: bool,
    /// Why the adapter did not try (capability missing).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Why the attempt failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BroadcastResult {
    /// The adapter broadcast the message.
    pub fn delivered(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: true,
            reason: None,
            error: None,
        }
    }

    /// The adapter has no broadcast capability.
    pub fn unsupported(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            success: false,
            reason: Some("broadcast not supported".to_owned()),
            error: None,
        }
    }

    /// The adapter tried and failed.
    pub fn failed(channel: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            channel: channel.into(),
            success: false,
            reason: None,
            error: Some(error.to_string()),
        }
    }
}
