//! Channel adapter contract and shared adapter state.
//!
//! Every platform integration implements [`ChannelAdapter`] and embeds an
//! [`AdapterCore`] holding identity, reply defaults, the installed message
//! handler, and the started flag. The core also owns the default reply path:
//! when no handler is installed, messages go to the [`ReplyService`] with
//! retry (see [`crate::reply::retry`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::{ChannelError, Result};
use crate::handler::MessageHandler;
use crate::message::{AdapterStatus, MessageContext, Metadata, NormalizedMessage, SendResult};
use crate::reply::retry::{self, RetryPolicy};
use crate::reply::{conversation_id, ChatRequest, ReplyOptions, ReplyService};

pub mod dispatch;

pub use dispatch::{dispatch_inbound, DispatchOutcome, ReplySink};

/// Fallback text sent when handling a message fails.
pub const DEFAULT_ERROR_MESSAGE: &str = "Sorry, I encountered an error processing your message.";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Reply defaults and behaviour shared by every adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterSettings {
    /// Bot to request replies from. Injected by the router when unset.
    pub bot_id: Option<String>,
    /// Default model.
    pub model: Option<String>,
    /// Default knowledge source filter.
    pub source_ids: Vec<String>,
    /// Default tag filter.
    pub tags: Vec<String>,
    /// Default retrieval depth.
    pub top: Option<u32>,
    /// Default reply token limit.
    pub max_reply_tokens: Option<u32>,
    /// Provider key forwarded to the reply service.
    pub provider_key: Option<String>,
    /// Text sent to the user when handling fails.
    pub error_message: String,
    /// Emit per-event and lifecycle log lines for this adapter.
    pub enable_logging: bool,
    /// Backoff for the default reply path.
    pub retry: RetryPolicy,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            bot_id: None,
            model: None,
            source_ids: Vec::new(),
            tags: Vec::new(),
            top: None,
            max_reply_tokens: None,
            provider_key: None,
            error_message: DEFAULT_ERROR_MESSAGE.to_owned(),
            enable_logging: true,
            retry: RetryPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Core state
// ---------------------------------------------------------------------------

/// State every adapter shares regardless of platform.
pub struct AdapterCore {
    channel_name: String,
    settings: AdapterSettings,
    bot_id: RwLock<Option<String>>,
    reply_service: RwLock<Option<Arc<dyn ReplyService>>>,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
    started: AtomicBool,
}

impl std::fmt::Debug for AdapterCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCore")
            .field("channel_name", &self.channel_name)
            .field("bot_id", &self.bot_id())
            .field("has_reply_service", &self.reply_service().is_some())
            .field("has_handler", &self.message_handler().is_some())
            .field("is_started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl AdapterCore {
    /// Create the core for `channel_name`.
    ///
    /// The reply service may be left unset and injected by the router.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] when `channel_name` is blank.
    pub fn new(
        channel_name: impl Into<String>,
        settings: AdapterSettings,
        reply_service: Option<Arc<dyn ReplyService>>,
    ) -> Result<Self> {
        let channel_name = channel_name.into();
        if channel_name.trim().is_empty() {
            return Err(ChannelError::configuration("channel name is required"));
        }
        let bot_id = settings.bot_id.clone().filter(|b| !b.trim().is_empty());
        Ok(Self {
            channel_name,
            settings,
            bot_id: RwLock::new(bot_id),
            reply_service: RwLock::new(reply_service),
            handler: RwLock::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Channel name; unique within a router.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Construction-time settings.
    pub fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    /// Whether this adapter's log lines are enabled.
    pub fn logging_enabled(&self) -> bool {
        self.settings.enable_logging
    }

    /// Bot id used for replies, once resolved.
    pub fn bot_id(&self) -> Option<String> {
        self.bot_id.read().ok().and_then(|b| b.clone())
    }

    /// Reply service used by the default reply path, once resolved.
    pub fn reply_service(&self) -> Option<Arc<dyn ReplyService>> {
        self.reply_service.read().ok().and_then(|s| s.clone())
    }

    /// Fill in a missing reply service and bot id. Existing values are kept.
    pub fn inject_defaults(
        &self,
        reply_service: &Arc<dyn ReplyService>,
        default_bot_id: Option<&str>,
    ) {
        if let Ok(mut slot) = self.reply_service.write() {
            if slot.is_none() {
                *slot = Some(Arc::clone(reply_service));
            }
        }
        if let (Some(default), Ok(mut slot)) = (default_bot_id, self.bot_id.write()) {
            if slot.is_none() {
                *slot = Some(default.to_owned());
            }
        }
    }

    /// Install or clear the message handler.
    pub fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = handler;
        }
    }

    /// The installed message handler, if any.
    pub fn message_handler(&self) -> Option<Arc<dyn MessageHandler>> {
        self.handler.read().ok().and_then(|h| h.clone())
    }

    /// Whether the adapter is receiving events.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Record that the adapter is able to receive events.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        if self.logging_enabled() {
            info!(channel = %self.channel_name, "adapter started");
        }
    }

    /// Record that the adapter released its platform resources.
    pub fn mark_stopped(&self) {
        let was_started = self.started.swap(false, Ordering::SeqCst);
        if was_started && self.logging_enabled() {
            info!(channel = %self.channel_name, "adapter stopped");
        }
    }

    /// Base status snapshot.
    pub fn status(&self) -> AdapterStatus {
        self.status_with(Metadata::new())
    }

    /// Status snapshot extended with channel-specific fields.
    ///
    /// Extras never replace the base fields.
    pub fn status_with(&self, mut extra: Metadata) -> AdapterStatus {
        for base in ["channel", "is_started", "bot_id", "model"] {
            extra.remove(base);
        }
        AdapterStatus {
            channel: self.channel_name.clone(),
            is_started: self.is_started(),
            bot_id: self.bot_id(),
            model: self.settings.model.clone(),
            extra,
        }
    }

    /// Build a reply request from adapter defaults and per-call overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] if no bot id is resolved.
    pub fn build_request(
        &self,
        message: &NormalizedMessage,
        options: &ReplyOptions,
    ) -> Result<ChatRequest> {
        let bot_id = self.bot_id().ok_or_else(|| {
            ChannelError::configuration(format!("{}: bot id is not set", self.channel_name))
        })?;
        let s = &self.settings;
        Ok(ChatRequest {
            bot_id,
            model: options.model.clone().or_else(|| s.model.clone()),
            provider_key: options
                .provider_key
                .clone()
                .or_else(|| s.provider_key.clone()),
            message: message.content.clone(),
            source_ids: options
                .source_ids
                .clone()
                .unwrap_or_else(|| s.source_ids.clone()),
            tags: options.tags.clone().unwrap_or_else(|| s.tags.clone()),
            top: options.top.or(s.top),
            max_reply_tokens: options.max_reply_tokens.or(s.max_reply_tokens),
            chat_id: conversation_id(&self.channel_name, &message.user_id),
            channel: self.channel_name.clone(),
            stream: false,
        })
    }

    /// Default reply path with the adapter's defaults.
    ///
    /// # Errors
    ///
    /// See [`AdapterCore::request_reply_with`].
    pub async fn request_reply(&self, message: &NormalizedMessage) -> Result<String> {
        self.request_reply_with(message, &ReplyOptions::default())
            .await
    }

    /// Default reply path with per-call overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] without a reply service or bot
    /// id, the last transient error after all retries, or
    /// [`ChannelError::InvalidResponse`] for a malformed envelope.
    pub async fn request_reply_with(
        &self,
        message: &NormalizedMessage,
        options: &ReplyOptions,
    ) -> Result<String> {
        let service = self.reply_service().ok_or_else(|| {
            ChannelError::configuration(format!(
                "{}: reply service is not set",
                self.channel_name
            ))
        })?;
        let request = self.build_request(message, options)?;
        let result = retry::request_reply(service.as_ref(), &request, self.settings.retry).await;
        if let Err(e) = &result {
            if self.logging_enabled() {
                error!(channel = %self.channel_name, error = %e, "failed to obtain reply");
            }
        }
        result
    }

    /// Dispatch to the installed handler, or fall back to the default reply
    /// path when none is installed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Handler`] when the handler fails, or any error
    /// of the default reply path.
    pub async fn handle_message(
        self: &Arc<Self>,
        message: NormalizedMessage,
        extras: Metadata,
    ) -> Result<Option<String>> {
        match self.message_handler() {
            Some(handler) => {
                let context = MessageContext {
                    channel: self.channel_name.clone(),
                    adapter: Arc::clone(self),
                    router: None,
                    reply_service: None,
                    extras,
                };
                debug!(channel = %self.channel_name, "dispatching to installed handler");
                handler
                    .handle(message, context)
                    .await
                    .map_err(ChannelError::Handler)
            }
            None => self.request_reply(&message).await.map(Some),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// The capability set every channel integration exposes to the router.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Shared adapter state.
    fn core(&self) -> &Arc<AdapterCore>;

    /// Channel name; the router's lookup key.
    fn channel_name(&self) -> &str {
        self.core().channel_name()
    }

    /// Establish the platform session.
    ///
    /// Returns only once the adapter can receive events.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Connection`] when authentication or session
    /// bootstrap fails.
    async fn start(&self) -> Result<()>;

    /// Release platform resources. Safe to call on a never-started adapter.
    ///
    /// # Errors
    ///
    /// Platform teardown failures; the router logs and ignores them.
    async fn stop(&self) -> Result<()> {
        self.core().mark_stopped();
        Ok(())
    }

    /// Deliver a message outside the normal reply flow.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Delivery`] on transport failure.
    async fn send_message(&self, recipient: &str, message: &str) -> Result<SendResult>;

    /// Fan a message out to every conversation the adapter knows about.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::BroadcastUnsupported`] unless overridden.
    async fn broadcast(&self, _message: &str) -> Result<()> {
        Err(ChannelError::BroadcastUnsupported {
            channel: self.channel_name().to_owned(),
        })
    }

    /// Side-effect-free status snapshot.
    fn status(&self) -> AdapterStatus {
        self.core().status()
    }
}

impl dyn ChannelAdapter {
    /// Produce the reply for a normalized message.
    ///
    /// Not part of the overridable trait surface: this and the per-event
    /// pipeline ([`dispatch_inbound`]) both go through
    /// [`AdapterCore::handle_message`], so a direct call and a platform event
    /// always take the same path.
    ///
    /// # Errors
    ///
    /// See [`AdapterCore::handle_message`].
    pub async fn handle_message(
        &self,
        message: NormalizedMessage,
        extras: Metadata,
    ) -> Result<Option<String>> {
        self.core().handle_message(message, extras).await
    }
}
