//! Telegram adapter behaviour that needs no Bot API round trip.

use std::sync::Arc;

use async_trait::async_trait;
use switchboard::adapter::{AdapterSettings, ChannelAdapter};
use switchboard::reply::{ChatEnvelope, ChatRequest, ReplyService, ReplyServiceError};
use switchboard::router::{Router, RouterOptions};
use switchboard::telegram::{TelegramAdapter, TelegramConfig, DEFAULT_WELCOME_MESSAGE};
use switchboard::ChannelError;

struct Unused;

#[async_trait]
impl ReplyService for Unused {
    async fn chat(&self, _request: &ChatRequest) -> Result<ChatEnvelope, ReplyServiceError> {
        Err(ReplyServiceError::Unavailable("not expected".to_owned()))
    }
}

fn adapter() -> TelegramAdapter {
    TelegramAdapter::new(
        TelegramConfig {
            bot_token: "123456:TEST".to_owned(),
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_owned(),
        },
        AdapterSettings {
            model: Some("gpt-4o-mini".to_owned()),
            ..AdapterSettings::default()
        },
        None,
    )
    .expect("adapter")
}

#[test]
fn registered_adapter_reports_injected_defaults() {
    let router = Router::new(
        Arc::new(Unused),
        RouterOptions {
            project_id: None,
            default_bot_id: Some("bot-default".to_owned()),
        },
    );
    router.register(Arc::new(adapter())).expect("register");

    let telegram = router.get_adapter("telegram").expect("registered");
    let status = telegram.status();

    assert_eq!(status.channel, "telegram");
    assert!(!status.is_started);
    assert_eq!(status.bot_id.as_deref(), Some("bot-default"));
    assert_eq!(status.model.as_deref(), Some("gpt-4o-mini"));
}

#[tokio::test]
async fn broadcast_is_unsupported() {
    let result = adapter().broadcast("hello everyone").await;
    assert!(matches!(
        result,
        Err(ChannelError::BroadcastUnsupported { ref channel }) if channel == "telegram"
    ));
}

#[tokio::test]
async fn stop_before_start_is_safe() {
    let adapter = adapter();
    adapter.stop().await.expect("stop");
    adapter.stop().await.expect("stop again");
    assert!(!adapter.status().is_started);
}

#[tokio::test]
async fn unstarted_router_broadcast_reports_unsupported() {
    let router = Router::new(
        Arc::new(Unused),
        RouterOptions {
            project_id: None,
            default_bot_id: Some("bot".to_owned()),
        },
    );
    router.register(Arc::new(adapter())).expect("register");

    let results = router.broadcast("hi", &[]).await;

    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].reason.as_deref(), Some("broadcast not supported"));
}
