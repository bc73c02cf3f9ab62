//! Switchboard: an omnichannel chat router.
//!
//! Chat platforms come in through [`adapter::ChannelAdapter`] implementations,
//! every inbound message is normalized to a [`message::NormalizedMessage`],
//! and replies come from either a caller-installed handler or the hosted
//! reply service (with retry). The [`router::Router`] owns the adapters and
//! their shared lifecycle.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod message;

pub mod handler;
pub mod reply;

pub mod adapter;
pub mod router;

pub mod telegram;
pub mod whatsapp;

pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod logging;

pub use adapter::{AdapterCore, AdapterSettings, ChannelAdapter};
pub use error::{ChannelError, Result};
pub use handler::{ErrorHandler, MessageHandler};
pub use message::{MessageContext, NormalizedMessage, SendResult};
pub use reply::{ReplyOptions, ReplyService};
pub use router::{Router, RouterOptions};
