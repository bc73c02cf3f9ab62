//! Telegram adapter: teloxide dispatcher feeding the shared dispatch pipeline.
//!
//! `start` authenticates with `getMe` before spawning the long-polling
//! dispatcher, so a bad token fails the start instead of the first poll.
//! Bot senders, non-text updates and blank messages are ignored; `/start`
//! answers with the welcome message.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use teloxide::dispatching::{ShutdownToken, UpdateFilterExt};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Recipient};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{dispatch_inbound, AdapterCore, AdapterSettings, ChannelAdapter, ReplySink};
use crate::error::{ChannelError, Result};
use crate::message::{AdapterStatus, Metadata, NormalizedMessage, SendResult};
use crate::reply::ReplyService;

/// Channel name used by the Telegram adapter.
pub const CHANNEL_NAME: &str = "telegram";

/// Default greeting for `/start`. `{name}` is replaced by the first name.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hello! How can I help you today?";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Telegram-specific adapter configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: String,
    /// Greeting sent on `/start`.
    pub welcome_message: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("welcome_message", &self.welcome_message)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Inbound classification
// ---------------------------------------------------------------------------

/// The fields of a Telegram message the adapter looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramInbound {
    /// Chat the message arrived in.
    pub chat_id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    pub chat_kind: &'static str,
    /// Telegram message id.
    pub message_id: i32,
    /// Sender user id.
    pub user_id: u64,
    /// Whether the sender is a bot.
    pub is_bot: bool,
    /// Sender @username.
    pub username: Option<String>,
    /// Sender first name.
    pub first_name: String,
    /// Sender last name.
    pub last_name: Option<String>,
    /// Message text, if any.
    pub text: Option<String>,
}

/// What to do with an inbound Telegram message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundAction {
    /// Not a user text message; drop it.
    Ignore,
    /// Reply with this greeting instead of dispatching.
    Greet(String),
    /// Dispatch the normalized message.
    Dispatch(NormalizedMessage),
}

impl TelegramInbound {
    /// Extract the relevant fields. Messages without a sender yield `None`.
    pub fn from_message(msg: &Message) -> Option<Self> {
        let user = msg.from.as_ref()?;
        let chat_kind = if msg.chat.is_private() {
            "private"
        } else if msg.chat.is_group() {
            "group"
        } else if msg.chat.is_supergroup() {
            "supergroup"
        } else {
            "channel"
        };
        Some(Self {
            chat_id: msg.chat.id.0,
            chat_kind,
            message_id: msg.id.0,
            user_id: user.id.0,
            is_bot: user.is_bot,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            text: msg.text().map(str::to_owned),
        })
    }

    /// Decide how to handle this message.
    pub fn classify(&self, welcome_message: &str) -> InboundAction {
        if self.is_bot {
            return InboundAction::Ignore;
        }
        let Some(text) = self.text.as_deref() else {
            return InboundAction::Ignore;
        };
        if is_start_command(text) {
            return InboundAction::Greet(welcome_message.replace("{name}", &self.first_name));
        }

        let mut metadata = Metadata::new();
        metadata.insert("chat_id".to_owned(), self.chat_id.into());
        metadata.insert("message_id".to_owned(), self.message_id.into());
        metadata.insert("first_name".to_owned(), self.first_name.clone().into());
        if let Some(last) = &self.last_name {
            metadata.insert("last_name".to_owned(), last.clone().into());
        }
        metadata.insert("chat_type".to_owned(), self.chat_kind.into());

        let display = self
            .username
            .clone()
            .or_else(|| Some(self.first_name.clone()));
        match NormalizedMessage::new(text, self.user_id.to_string(), display, metadata) {
            Some(message) => InboundAction::Dispatch(message),
            None => InboundAction::Ignore,
        }
    }
}

/// `/start`, optionally addressed as `/start@bot_name`.
fn is_start_command(text: &str) -> bool {
    let Some(without_slash) = text.trim().strip_prefix('/') else {
        return false;
    };
    let full_command = without_slash
        .split_once(' ')
        .map_or(without_slash, |(cmd, _)| cmd);
    let command = full_command.split('@').next().unwrap_or(full_command);
    command == "start"
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Shared state injected into the dispatcher endpoint.
struct TelegramShared {
    core: Arc<AdapterCore>,
    welcome_message: String,
}

/// Running dispatcher.
struct Polling {
    shutdown: ShutdownToken,
    task: JoinHandle<()>,
}

/// Telegram Bot API adapter.
pub struct TelegramAdapter {
    core: Arc<AdapterCore>,
    bot: Bot,
    welcome_message: String,
    identity: RwLock<Option<(u64, Option<String>)>>,
    polling: Mutex<Option<Polling>>,
}

impl TelegramAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] when the bot token is empty.
    pub fn new(
        config: TelegramConfig,
        settings: AdapterSettings,
        reply_service: Option<Arc<dyn ReplyService>>,
    ) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(ChannelError::configuration("telegram bot token is required"));
        }
        let core = AdapterCore::new(CHANNEL_NAME, settings, reply_service)?;
        Ok(Self {
            core: Arc::new(core),
            bot: Bot::new(config.bot_token),
            welcome_message: config.welcome_message,
            identity: RwLock::new(None),
            polling: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn core(&self) -> &Arc<AdapterCore> {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        let mut polling = self.polling.lock().await;
        if polling.is_some() {
            debug!("telegram adapter already polling");
            return Ok(());
        }

        if self.core.logging_enabled() {
            info!("telegram bot starting");
        }
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| ChannelError::connection(CHANNEL_NAME, e))?;
        if let Ok(mut identity) = self.identity.write() {
            *identity = Some((me.user.id.0, me.user.username.clone()));
        }

        let shared = Arc::new(TelegramShared {
            core: Arc::clone(&self.core),
            welcome_message: self.welcome_message.clone(),
        });
        let handler = Update::filter_message().endpoint(handle_update);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![shared])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();
        let task = tokio::spawn(async move { dispatcher.dispatch().await });

        *polling = Some(Polling { shutdown, task });
        self.core.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(Polling { shutdown, task }) = self.polling.lock().await.take() {
            match shutdown.shutdown() {
                Ok(done) => done.await,
                Err(_) => task.abort(),
            }
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "telegram dispatcher task failed");
                }
            }
        }
        self.core.mark_stopped();
        Ok(())
    }

    async fn send_message(&self, recipient: &str, message: &str) -> Result<SendResult> {
        let target = match recipient.parse::<i64>() {
            Ok(id) => Recipient::Id(ChatId(id)),
            Err(_) => Recipient::ChannelUsername(recipient.to_owned()),
        };
        let sent = self
            .bot
            .send_message(target, message)
            .await
            .map_err(|e| {
                warn!(recipient, error = %e, "failed to send telegram message");
                ChannelError::delivery(recipient, e)
            })?;
        Ok(SendResult::accepted(
            CHANNEL_NAME,
            recipient,
            Some(sent.id.0.to_string()),
        ))
    }

    fn status(&self) -> AdapterStatus {
        let mut extra = Metadata::new();
        if let Some((user_id, username)) = self.identity.read().ok().and_then(|i| i.clone()) {
            extra.insert("platform_user_id".to_owned(), user_id.into());
            if let Some(name) = username {
                extra.insert("username".to_owned(), name.into());
            }
        }
        self.core.status_with(extra)
    }
}

// ---------------------------------------------------------------------------
// Dispatcher endpoint
// ---------------------------------------------------------------------------

/// Replies into the chat a message came from.
struct ChatSink {
    bot: Bot,
    chat_id: ChatId,
    label: String,
}

#[async_trait]
impl ReplySink for ChatSink {
    fn recipient(&self) -> &str {
        &self.label
    }

    async fn typing(&self) {
        if let Err(e) = self
            .bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await
        {
            debug!(error = %e, "failed to send typing indicator");
        }
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::delivery(self.label.clone(), e))
    }
}

async fn handle_update(bot: Bot, msg: Message, shared: Arc<TelegramShared>) -> ResponseResult<()> {
    let Some(inbound) = TelegramInbound::from_message(&msg) else {
        return Ok(());
    };

    let sink = ChatSink {
        bot,
        chat_id: msg.chat.id,
        label: msg.chat.id.0.to_string(),
    };

    match inbound.classify(&shared.welcome_message) {
        InboundAction::Ignore => {}
        InboundAction::Greet(greeting) => {
            if let Err(e) = sink.deliver(&greeting).await {
                warn!(error = %e, "failed to send welcome message");
            }
        }
        InboundAction::Dispatch(message) => {
            let mut extras = Metadata::new();
            extras.insert("chat_id".to_owned(), inbound.chat_id.into());
            dispatch_inbound(&shared.core, message, extras, &sink).await;
        }
    }
    Ok(())
}
