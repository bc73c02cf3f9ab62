//! Configuration loading.
//!
//! `switchboard.toml` holds everything except secrets. Secrets are referenced
//! by environment variable name and resolved through [`crate::credentials`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::adapter::DEFAULT_ERROR_MESSAGE;
use crate::reply::http::DEFAULT_BASE_URL;
use crate::reply::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::telegram::DEFAULT_WELCOME_MESSAGE;

/// Config file name inside [`config_dir`].
pub const CONFIG_FILE_NAME: &str = "switchboard.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Hosted reply service connection.
    pub reply_service: ReplyServiceConfig,

    /// Backoff for reply service calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-channel adapter configuration.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Reply service endpoint and project.
#[derive(Debug, Deserialize)]
pub struct ReplyServiceConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable name holding the API key.
    pub api_key_env: String,

    /// Project the bots belong to.
    pub project_id: String,

    /// Bot used by adapters that do not name their own.
    #[serde(default)]
    pub default_bot_id: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ReplyServiceConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry settings for the default reply path.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds. Doubles per attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Convert to the runtime policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

/// Channels section. A missing table means the channel is not configured.
#[derive(Debug, Default, Deserialize)]
pub struct ChannelsConfig {
    /// Telegram adapter.
    #[serde(default)]
    pub telegram: Option<TelegramChannelConfig>,

    /// WhatsApp bridge adapter.
    #[serde(default)]
    pub whatsapp: Option<WhatsAppChannelConfig>,
}

/// Settings every adapter accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    /// Bot answering on this channel. Falls back to the router default.
    #[serde(default)]
    pub bot_id: Option<String>,

    /// Model override.
    #[serde(default)]
    pub model: Option<String>,

    /// Knowledge source ids.
    #[serde(default)]
    pub source_ids: Vec<String>,

    /// Knowledge tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Retrieval depth.
    #[serde(default)]
    pub top: Option<u32>,

    /// Reply length cap.
    #[serde(default)]
    pub max_reply_tokens: Option<u32>,

    /// Environment variable name holding a provider key for the model.
    #[serde(default)]
    pub provider_key_env: Option<String>,

    /// Text sent to the user when handling fails.
    #[serde(default = "default_error_message")]
    pub error_message: String,

    /// Per-adapter event logging.
    #[serde(default = "default_true")]
    pub enable_logging: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            bot_id: None,
            model: None,
            source_ids: Vec::new(),
            tags: Vec::new(),
            top: None,
            max_reply_tokens: None,
            provider_key_env: None,
            error_message: default_error_message(),
            enable_logging: true,
        }
    }
}

/// `[channels.telegram]`.
#[derive(Debug, Deserialize)]
pub struct TelegramChannelConfig {
    /// Whether `start` brings this adapter up.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variable name holding the bot token.
    pub bot_token_env: String,

    /// Greeting for `/start`. `{name}` is replaced by the sender's first name.
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,

    /// Shared adapter settings.
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

/// `[channels.whatsapp]`.
#[derive(Debug, Deserialize)]
pub struct WhatsAppChannelConfig {
    /// Whether `start` brings this adapter up.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the bridge sidecar.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Phone numbers allowed to talk to the bot. Empty allows everyone.
    #[serde(default)]
    pub allowed_contacts: Vec<String>,

    /// Shared adapter settings.
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

// Default value functions for serde

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_error_message() -> String {
    DEFAULT_ERROR_MESSAGE.to_owned()
}
fn default_welcome_message() -> String {
    DEFAULT_WELCOME_MESSAGE.to_owned()
}
fn default_bridge_url() -> String {
    format!(
        "http://127.0.0.1:{}",
        crate::whatsapp::client::DEFAULT_BRIDGE_PORT
    )
}
fn default_true() -> bool {
    true
}

/// Parse configuration from TOML text.
///
/// # Errors
///
/// Returns an error if the text is not valid configuration.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = toml::from_str(contents)?;
    if config.reply_service.project_id.trim().is_empty() {
        anyhow::bail!("reply_service.project_id must not be empty");
    }
    Ok(config)
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("failed to parse config at {}", path.display()))
}

/// Resolve the default config directory (`~/.switchboard/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".switchboard"))
}

/// Default config file path (`~/.switchboard/switchboard.toml`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Default credentials file path (`~/.switchboard/.env`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_env_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join(".env"))
}

/// Default log directory (`~/.switchboard/logs`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn logs_dir() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("logs"))
}
