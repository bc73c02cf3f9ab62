//! Retry with exponential backoff for reply service calls.
//!
//! Transport failures and service-reported `err` fields are retried. A
//! success-shaped envelope without a reply, or a body that does not decode,
//! is raised immediately.

use std::time::Duration;

use tracing::{debug, warn};

use super::{ChatRequest, ReplyService, ReplyServiceError};
use crate::error::ChannelError;

/// Default number of attempts (first try plus two retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Backoff policy for reply service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

/// Request a reply, retrying transient failures per `policy`.
///
/// # Errors
///
/// Returns the last transient error once attempts are exhausted, or
/// [`ChannelError::InvalidResponse`] as soon as a malformed envelope arrives.
pub async fn request_reply(
    service: &dyn ReplyService,
    request: &ChatRequest,
    policy: RetryPolicy,
) -> Result<String, ChannelError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        match attempt_once(service, request).await {
            Ok(reply) => return Ok(reply),
            Err(e) if e.is_transient() && attempt.saturating_add(1) < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    channel = %request.channel,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "reply service call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn attempt_once(
    service: &dyn ReplyService,
    request: &ChatRequest,
) -> Result<String, ChannelError> {
    let envelope = service.chat(request).await.map_err(|e| match e {
        ReplyServiceError::Malformed(message) => ChannelError::InvalidResponse { message },
        other => other.into(),
    })?;

    if let Some(err) = envelope.service_error() {
        let message = match err {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ReplyServiceError::Rejected(message).into());
    }

    match envelope.reply_text() {
        Some(reply) => {
            debug!(channel = %request.channel, chat_id = %request.chat_id, "reply received");
            Ok(reply.to_owned())
        }
        None => Err(ChannelError::InvalidResponse {
            message: "envelope has no response.chat.reply".to_owned(),
        }),
    }
}
