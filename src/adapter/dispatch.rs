//! Per-event pipeline: handle a normalized message and deliver the outcome.
//!
//! Adapters filter and normalize platform events themselves, then hand the
//! message to [`dispatch_inbound`] together with a [`ReplySink`] addressing
//! the conversation it came from. Failures never escape this function: the
//! configured error message is sent instead, and a failure to send that is
//! only logged.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

use super::AdapterCore;
use crate::error::Result;
use crate::message::{Metadata, NormalizedMessage};

/// Where replies for one inbound event go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Recipient label used in logs and delivery errors.
    fn recipient(&self) -> &str;

    /// Show a typing indicator. Best-effort; no-op by default.
    async fn typing(&self) {}

    /// Send `text` back to the conversation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChannelError::Delivery`] on transport failure.
    async fn deliver(&self, text: &str) -> Result<()>;
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reply was produced and delivered.
    Replied,
    /// The handler chose not to reply.
    NoReply,
    /// Handling or delivery failed; the error message was delivered.
    FallbackSent {
        /// Description of the original failure.
        error: String,
    },
    /// Handling failed and the error message could not be delivered either.
    FallbackFailed {
        /// Description of the original failure.
        error: String,
    },
}

/// Run one inbound message through handle → deliver with fallback.
pub async fn dispatch_inbound(
    core: &Arc<AdapterCore>,
    message: NormalizedMessage,
    extras: Metadata,
    sink: &dyn ReplySink,
) -> DispatchOutcome {
    let span = tracing::info_span!(
        "inbound",
        channel = %core.channel_name(),
        event_id = %Uuid::new_v4(),
    );
    run(core, message, extras, sink).instrument(span).await
}

async fn run(
    core: &Arc<AdapterCore>,
    message: NormalizedMessage,
    extras: Metadata,
    sink: &dyn ReplySink,
) -> DispatchOutcome {
    let logging = core.logging_enabled();
    if logging {
        debug!(user_id = %message.user_id, recipient = %sink.recipient(), "handling message");
    }

    sink.typing().await;

    let failure = match core.handle_message(message, extras).await {
        Ok(Some(reply)) => match sink.deliver(&reply).await {
            Ok(()) => return DispatchOutcome::Replied,
            Err(e) => e,
        },
        Ok(None) => {
            if logging {
                debug!("handler produced no reply");
            }
            return DispatchOutcome::NoReply;
        }
        Err(e) => e,
    };

    let error = failure.to_string();
    if logging {
        error!(error = %error, recipient = %sink.recipient(), "error handling message");
    }

    match sink.deliver(&core.settings().error_message).await {
        Ok(()) => DispatchOutcome::FallbackSent { error },
        Err(send_err) => {
            if logging {
                warn!(error = %send_err, recipient = %sink.recipient(), "failed to send error message");
            }
            DispatchOutcome::FallbackFailed { error }
        }
    }
}
