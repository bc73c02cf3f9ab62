//! Assemble a [`Router`] from configuration and credentials.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::adapter::{AdapterSettings, ChannelAdapter};
use crate::config::{ChannelSettings, Config, ReplyServiceConfig};
use crate::credentials::Credentials;
use crate::reply::http::HttpReplyService;
use crate::reply::retry::RetryPolicy;
use crate::reply::ReplyService;
use crate::router::{Router, RouterOptions};
use crate::telegram::{TelegramAdapter, TelegramConfig};
use crate::whatsapp::{WhatsAppAdapter, WhatsAppConfig};

/// Resolve shared channel settings into adapter settings.
///
/// # Errors
///
/// Returns an error when `provider_key_env` names a missing credential.
pub fn adapter_settings(
    settings: &ChannelSettings,
    credentials: &Credentials,
    retry: RetryPolicy,
) -> anyhow::Result<AdapterSettings> {
    let provider_key = settings
        .provider_key_env
        .as_deref()
        .map(|key| credentials.require(key))
        .transpose()?;
    Ok(AdapterSettings {
        bot_id: settings.bot_id.clone(),
        model: settings.model.clone(),
        source_ids: settings.source_ids.clone(),
        tags: settings.tags.clone(),
        top: settings.top,
        max_reply_tokens: settings.max_reply_tokens,
        provider_key,
        error_message: settings.error_message.clone(),
        enable_logging: settings.enable_logging,
        retry,
    })
}

/// Build the HTTP reply service.
///
/// # Errors
///
/// Returns an error when the API key is missing or the client rejects the
/// configuration.
pub fn reply_service(
    config: &ReplyServiceConfig,
    credentials: &Credentials,
) -> anyhow::Result<Arc<dyn ReplyService>> {
    let api_key = credentials.require(&config.api_key_env)?;
    let service = HttpReplyService::new(
        config.base_url.clone(),
        api_key,
        config.project_id.clone(),
        config.timeout(),
    )?;
    Ok(Arc::new(service))
}

/// Build every enabled adapter, in config order (telegram, then whatsapp).
///
/// Adapters are created without a reply service; the router injects its own.
///
/// # Errors
///
/// Returns an error when a channel's credentials are missing or its settings
/// are invalid.
pub fn adapters(
    config: &Config,
    credentials: &Credentials,
) -> anyhow::Result<Vec<Arc<dyn ChannelAdapter>>> {
    let retry = config.retry.policy();
    let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();

    if let Some(tg) = config.channels.telegram.as_ref().filter(|c| c.enabled) {
        let bot_token = credentials
            .require(&tg.bot_token_env)
            .context("telegram bot token")?;
        let adapter = TelegramAdapter::new(
            TelegramConfig {
                bot_token,
                welcome_message: tg.welcome_message.clone(),
            },
            adapter_settings(&tg.settings, credentials, retry)?,
            None,
        )?;
        adapters.push(Arc::new(adapter));
    }

    if let Some(wa) = config.channels.whatsapp.as_ref().filter(|c| c.enabled) {
        let adapter = WhatsAppAdapter::new(
            WhatsAppConfig {
                bridge_url: wa.bridge_url.clone(),
                allowed_contacts: wa.allowed_contacts.clone(),
                ..WhatsAppConfig::default()
            },
            adapter_settings(&wa.settings, credentials, retry)?,
            None,
        )?;
        adapters.push(Arc::new(adapter));
    }

    Ok(adapters)
}

/// Build a router with every enabled adapter registered but not started.
///
/// # Errors
///
/// Returns an error when the reply service or any adapter cannot be built,
/// or the router rejects an adapter.
pub fn build_router(config: &Config, credentials: &Credentials) -> anyhow::Result<Router> {
    let service = reply_service(&config.reply_service, credentials)?;
    let adapters = adapters(config, credentials)?;
    let router = Router::with_adapters(
        service,
        RouterOptions {
            project_id: Some(config.reply_service.project_id.clone()),
            default_bot_id: config.reply_service.default_bot_id.clone(),
        },
        adapters,
    )?;
    info!(channels = ?router.channel_names(), "router assembled");
    Ok(router)
}
