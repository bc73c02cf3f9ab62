//! Error taxonomy shared by the router, the adapter contract and the reply path.

use std::error::Error as StdError;

use crate::reply::ReplyServiceError;

/// Crate-wide result type for routing and adapter operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors raised by adapters, the router and the default reply path.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A required construction parameter is missing or invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// What is missing or wrong.
        message: String,
    },

    /// An adapter failed to authenticate or bootstrap its platform session.
    #[error("{channel}: connection failed: {message}")]
    Connection {
        /// Channel whose session could not be established.
        channel: String,
        /// Platform-supplied reason.
        message: String,
    },

    /// A reply or out-of-band message could not be delivered.
    #[error("delivery to {recipient} failed: {source}")]
    Delivery {
        /// Recipient the message was addressed to.
        recipient: String,
        /// Underlying transport error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The reply service answered with a success envelope lacking a reply.
    #[error("invalid reply service response: {message}")]
    InvalidResponse {
        /// Description of the missing payload.
        message: String,
    },

    /// No adapter is registered under the given channel name.
    #[error("adapter for channel \"{channel}\" not found")]
    NotFound {
        /// The unknown channel name.
        channel: String,
    },

    /// An adapter with the same channel name is already registered.
    #[error("adapter for channel \"{channel}\" is already registered")]
    DuplicateChannel {
        /// The colliding channel name.
        channel: String,
    },

    /// The router is part way through starting or stopping.
    #[error("router is {state}")]
    Transitioning {
        /// Lifecycle state at the time of the call.
        state: String,
    },

    /// The adapter has no broadcast capability.
    #[error("broadcast not supported")]
    BroadcastUnsupported {
        /// Channel that was asked to broadcast.
        channel: String,
    },

    /// The reply service failed at the transport level or reported an error.
    #[error(transparent)]
    Service(#[from] ReplyServiceError),

    /// A caller-installed message handler failed.
    #[error("message handler failed: {0:#}")]
    Handler(#[source] anyhow::Error),
}

impl ChannelError {
    /// Build a [`ChannelError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl std::fmt::Display) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    /// Build a [`ChannelError::Connection`] for the given channel.
    #[must_use]
    pub fn connection(channel: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Connection {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Build a [`ChannelError::Delivery`] carrying the recipient and cause.
    #[must_use]
    pub fn delivery(
        recipient: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Delivery {
            recipient: recipient.into(),
            source: source.into(),
        }
    }

    /// Build a [`ChannelError::NotFound`].
    #[must_use]
    pub fn not_found(channel: impl Into<String>) -> Self {
        Self::NotFound {
            channel: channel.into(),
        }
    }

    /// Whether the default reply path may retry after this error.
    ///
    /// Only reply service transport and service-reported failures qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_transient())
    }
}
