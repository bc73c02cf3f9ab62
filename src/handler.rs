//! Caller-supplied message and error handlers.
//!
//! Both traits have blanket implementations for async closures, so
//! `router.on_message(|msg, ctx| async move { Ok(Some(msg.content)) })` works.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{MessageContext, NormalizedMessage};

/// Produces the reply for an inbound message.
///
/// `Ok(None)` means nothing is sent back for this event.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// Any error is offered to the router's error handler, then to the
    /// adapter's fallback path.
    async fn handle(
        &self,
        message: NormalizedMessage,
        context: MessageContext,
    ) -> anyhow::Result<Option<String>>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(NormalizedMessage, MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send,
{
    async fn handle(
        &self,
        message: NormalizedMessage,
        context: MessageContext,
    ) -> anyhow::Result<Option<String>> {
        (self)(message, context).await
    }
}

/// Turns a handler failure into a reply for the user.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Produce the reply to send instead of propagating `error`.
    ///
    /// # Errors
    ///
    /// A failing error handler causes the original error to propagate.
    async fn handle(
        &self,
        error: Arc<anyhow::Error>,
        message: NormalizedMessage,
        context: MessageContext,
    ) -> anyhow::Result<String>;
}

#[async_trait]
impl<F, Fut> ErrorHandler for F
where
    F: Fn(Arc<anyhow::Error>, NormalizedMessage, MessageContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send,
{
    async fn handle(
        &self,
        error: Arc<anyhow::Error>,
        message: NormalizedMessage,
        context: MessageContext,
    ) -> anyhow::Result<String> {
        (self)(error, message, context).await
    }
}
