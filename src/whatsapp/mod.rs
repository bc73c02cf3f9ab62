//! WhatsApp adapter backed by an HTTP bridge sidecar.
//!
//! The bridge holds the WhatsApp Web session. `start` waits until the bridge
//! reports a connected session, then long-polls for events and dispatches
//! each inbound message on its own task.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::{dispatch_inbound, AdapterCore, AdapterSettings, ChannelAdapter, ReplySink};
use crate::error::{ChannelError, Result};
use crate::message::{AdapterStatus, Metadata, NormalizedMessage, SendResult};
use crate::reply::ReplyService;

pub mod client;
pub mod events;

use self::client::WhatsAppClient;
use self::events::{spawn_event_listener, WhatsAppEvent};

/// Channel name used by the WhatsApp adapter.
pub const CHANNEL_NAME: &str = "whatsapp";

/// JID suffix for individual contacts.
const CONTACT_JID_SUFFIX: &str = "@s.whatsapp.net";

/// Buffered events between the poller and the dispatcher.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Errors from the WhatsApp bridge.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// HTTP request to the bridge failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The bridge answered without the expected data.
    #[error("bridge unavailable")]
    BridgeUnavailable,

    /// The bridge is running but WhatsApp is not connected (needs QR scan).
    #[error("not connected to WhatsApp")]
    NotConnected,

    /// The bridge refused the request.
    #[error("bridge rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Bridge-supplied reason.
        message: String,
    },
}

/// WhatsApp-specific adapter configuration.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Base URL of the bridge, e.g. `http://127.0.0.1:3001`.
    pub bridge_url: String,
    /// Phone numbers allowed to talk to the bot. Empty allows everyone.
    pub allowed_contacts: Vec<String>,
    /// Health checks made by `start` before giving up.
    pub health_retries: u32,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: format!("http://127.0.0.1:{}", client::DEFAULT_BRIDGE_PORT),
            allowed_contacts: Vec::new(),
            health_retries: 5,
        }
    }
}

/// Contact part of a JID (`15551234567@s.whatsapp.net` → `15551234567`).
pub fn contact_id(jid: &str) -> &str {
    jid.split_once('@').map_or(jid, |(user, _)| user)
}

/// JID for a recipient given either as a phone number or a full JID.
pub fn to_jid(recipient: &str) -> String {
    if recipient.contains('@') {
        recipient.to_owned()
    } else {
        format!("{recipient}{CONTACT_JID_SUFFIX}")
    }
}

/// Normalize a bridge message event, applying the sender filters.
///
/// Returns `None` for our own messages, contacts outside a non-empty
/// allow-list, non-message events and blank text.
pub fn normalize_event(event: &WhatsAppEvent, allowed_contacts: &[String]) -> Option<NormalizedMessage> {
    let WhatsAppEvent::Message {
        jid,
        text,
        from_me,
        message_id,
        push_name,
        is_group,
        timestamp,
    } = event
    else {
        return None;
    };
    if *from_me {
        return None;
    }
    let contact = contact_id(jid);
    if !allowed_contacts.is_empty() && !allowed_contacts.iter().any(|c| c == contact) {
        debug!(contact, "message dropped: contact not in allowed_contacts");
        return None;
    }

    let mut metadata = Metadata::new();
    metadata.insert("chat_id".to_owned(), jid.clone().into());
    metadata.insert("is_group".to_owned(), (*is_group).into());
    if let Some(id) = message_id {
        metadata.insert("message_id".to_owned(), id.clone().into());
    }
    if let Some(ts) = timestamp {
        metadata.insert("timestamp".to_owned(), (*ts).into());
    }
    NormalizedMessage::new(text.clone(), contact, push_name.clone(), metadata)
}

/// Running poller and dispatcher tasks.
struct Listener {
    poller: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// WhatsApp adapter.
pub struct WhatsAppAdapter {
    core: Arc<AdapterCore>,
    client: Arc<WhatsAppClient>,
    allowed_contacts: Arc<Vec<String>>,
    listener: Mutex<Option<Listener>>,
}

impl WhatsAppAdapter {
    /// Create the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Configuration`] when the bridge URL is empty.
    pub fn new(
        config: WhatsAppConfig,
        settings: AdapterSettings,
        reply_service: Option<Arc<dyn ReplyService>>,
    ) -> Result<Self> {
        if config.bridge_url.trim().is_empty() {
            return Err(ChannelError::configuration("whatsapp bridge url is required"));
        }
        let core = AdapterCore::new(CHANNEL_NAME, settings, reply_service)?;
        let client = WhatsAppClient::new(config.bridge_url).with_health_retries(config.health_retries);
        Ok(Self {
            core: Arc::new(core),
            client: Arc::new(client),
            allowed_contacts: Arc::new(config.allowed_contacts),
            listener: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn core(&self) -> &Arc<AdapterCore> {
        &self.core
    }

    async fn start(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            debug!("whatsapp adapter already listening");
            return Ok(());
        }

        self.client
            .wait_healthy()
            .await
            .map_err(|e| ChannelError::connection(CHANNEL_NAME, e))?;

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let poller = spawn_event_listener(self.client.base_url().to_owned(), event_tx);

        let core = Arc::clone(&self.core);
        let client = Arc::clone(&self.client);
        let allowed = Arc::clone(&self.allowed_contacts);
        let dispatcher = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match &event {
                    WhatsAppEvent::Connected => info!("WhatsApp session connected"),
                    WhatsAppEvent::Disconnected { reason } => {
                        warn!(reason = reason.as_deref().unwrap_or("unknown"), "WhatsApp session disconnected");
                    }
                    WhatsAppEvent::Message { jid, .. } => {
                        let Some(message) = normalize_event(&event, &allowed) else {
                            continue;
                        };
                        let sink = JidSink {
                            client: Arc::clone(&client),
                            jid: jid.clone(),
                        };
                        let core = Arc::clone(&core);
                        tokio::spawn(async move {
                            let mut extras = Metadata::new();
                            extras.insert("jid".to_owned(), sink.jid.clone().into());
                            dispatch_inbound(&core, message, extras, &sink).await;
                        });
                    }
                }
            }
        });

        *listener = Some(Listener { poller, dispatcher });
        if self.core.logging_enabled() {
            info!(bridge = %self.client.base_url(), "WhatsApp connected");
        }
        self.core.mark_started();
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(Listener { poller, dispatcher }) = self.listener.lock().await.take() {
            poller.abort();
            dispatcher.abort();
        }
        self.core.mark_stopped();
        Ok(())
    }

    async fn send_message(&self, recipient: &str, message: &str) -> Result<SendResult> {
        let jid = to_jid(recipient);
        let message_id = self
            .client
            .send_text(&jid, message)
            .await
            .map_err(|e| ChannelError::delivery(recipient, e))?;
        Ok(SendResult::accepted(CHANNEL_NAME, recipient, message_id))
    }

    /// Sends to every allowed contact. Fails without an allow-list.
    async fn broadcast(&self, message: &str) -> Result<()> {
        if self.allowed_contacts.is_empty() {
            return Err(ChannelError::configuration(
                "whatsapp broadcast needs allowed_contacts",
            ));
        }
        let mut failed = Vec::new();
        for contact in self.allowed_contacts.iter() {
            if let Err(e) = self.client.send_text(&to_jid(contact), message).await {
                warn!(contact = %contact, error = %e, "broadcast delivery failed");
                failed.push(contact.clone());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::delivery(
                failed.join(","),
                format!("{} of {} contacts failed", failed.len(), self.allowed_contacts.len()),
            ))
        }
    }

    fn status(&self) -> AdapterStatus {
        let mut extra = Metadata::new();
        extra.insert(
            "allowed_contacts".to_owned(),
            self.allowed_contacts.len().into(),
        );
        extra.insert(
            "has_allow_list".to_owned(),
            (!self.allowed_contacts.is_empty()).into(),
        );
        self.core.status_with(extra)
    }
}

/// Replies into one WhatsApp conversation.
struct JidSink {
    client: Arc<WhatsAppClient>,
    jid: String,
}

#[async_trait]
impl ReplySink for JidSink {
    fn recipient(&self) -> &str {
        &self.jid
    }

    async fn typing(&self) {
        self.client.send_typing(&self.jid).await;
    }

    async fn deliver(&self, text: &str) -> Result<()> {
        self.client
            .send_text(&self.jid, text)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::delivery(self.jid.clone(), e))
    }
}
