//! Event listener for incoming WhatsApp messages.
//!
//! Long-polls the bridge's `/events/poll` endpoint and forwards events over an
//! mpsc channel. Reconnects with exponential backoff on network errors.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// An event reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum WhatsAppEvent {
    /// A message was received (or sent by us from another device).
    #[serde(rename = "message")]
    Message {
        /// JID of the conversation.
        jid: String,
        /// Message text content.
        #[serde(default)]
        text: String,
        /// Whether this message was sent by the linked account.
        #[serde(default)]
        from_me: bool,
        /// Bridge-assigned message identifier.
        #[serde(default)]
        message_id: Option<String>,
        /// Sender display name.
        #[serde(default)]
        push_name: Option<String>,
        /// Whether the conversation is a group.
        #[serde(default)]
        is_group: bool,
        /// Unix timestamp, seconds.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Session established.
    #[serde(rename = "connected")]
    Connected,
    /// Session lost.
    #[serde(rename = "disconnected")]
    Disconnected {
        /// Human-readable reason, if available.
        reason: Option<String>,
    },
}

/// Long-poll timeout for the HTTP client.
const POLL_TIMEOUT_SECS: u64 = 60;

/// Initial reconnect backoff (milliseconds).
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum reconnect backoff (milliseconds).
const MAX_BACKOFF_MS: u64 = 30_000;

/// Pause after a non-success poll response.
const NON_SUCCESS_PAUSE_SECS: u64 = 5;

/// Spawn a listener that forwards bridge events to `event_tx`.
///
/// Returns immediately. The task ends when the receiver is dropped.
pub fn spawn_event_listener(
    base_url: String,
    event_tx: mpsc::Sender<WhatsAppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_url = format!("{base_url}/events/poll");
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            info!(url = %poll_url, "connecting to WhatsApp event stream");

            match poll_events(&poll_url, &event_tx).await {
                Ok(()) => {
                    info!("WhatsApp event stream closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms, "WhatsApp event stream error, reconnecting");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                }
            }
        }
    })
}

/// Poll until the receiver goes away. Returns `Err` on non-timeout network
/// errors so the caller can reconnect with backoff.
async fn poll_events(
    poll_url: &str,
    event_tx: &mpsc::Sender<WhatsAppEvent>,
) -> Result<(), reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(POLL_TIMEOUT_SECS))
        .build()?;

    loop {
        if event_tx.is_closed() {
            return Ok(());
        }
        match client.get(poll_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Vec<WhatsAppEvent>>().await {
                Ok(events) => {
                    for event in events {
                        debug!(?event, "received WhatsApp event");
                        if event_tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "undecodable event batch");
                    tokio::time::sleep(Duration::from_secs(NON_SUCCESS_PAUSE_SECS)).await;
                }
            },
            Ok(resp) => {
                debug!(status = %resp.status(), "event poll returned non-success");
                tokio::time::sleep(Duration::from_secs(NON_SUCCESS_PAUSE_SECS)).await;
            }
            Err(e) if e.is_timeout() => continue,
            Err(e) => return Err(e),
        }
    }
}
