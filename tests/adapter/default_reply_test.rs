//! Default reply path: request shape, overrides and retry timing.

use std::sync::Arc;
use std::time::Duration;

use switchboard::adapter::{AdapterCore, AdapterSettings};
use switchboard::reply::retry::RetryPolicy;
use switchboard::reply::{ChatEnvelope, ReplyOptions, ReplyService};
use switchboard::ChannelError;
use tokio::time::Instant;

use crate::support::{message, transport_error, ScriptedService};

fn core_with(service: Arc<ScriptedService>, settings: AdapterSettings) -> AdapterCore {
    let service: Arc<dyn ReplyService> = service;
    AdapterCore::new("telegram", settings, Some(service)).expect("core")
}

fn settings() -> AdapterSettings {
    AdapterSettings {
        bot_id: Some("bot-7".to_owned()),
        model: Some("gpt-4o-mini".to_owned()),
        source_ids: vec!["faq".to_owned()],
        tags: vec!["support".to_owned()],
        top: Some(5),
        max_reply_tokens: Some(300),
        ..AdapterSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_takes_three_calls_and_backs_off() {
    let service = ScriptedService::scripted(vec![transport_error(), transport_error()], "finally");
    let core = core_with(Arc::clone(&service), settings());

    let started = Instant::now();
    let reply = core.request_reply(&message("hi")).await.expect("reply");
    let elapsed = started.elapsed();

    assert_eq!(reply, "finally");
    assert_eq!(service.calls(), 3);
    // 1s after the first failure, 2s after the second.
    let gaps = service.call_gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_secs(1), "first gap {:?}", gaps[0]);
    assert!(gaps[0] < Duration::from_secs(2), "first gap {:?}", gaps[0]);
    assert!(gaps[1] >= Duration::from_secs(2), "second gap {:?}", gaps[1]);
    assert!(gaps[1] < Duration::from_secs(3), "second gap {:?}", gaps[1]);
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_last_error() {
    let service = ScriptedService::failing();
    let core = core_with(Arc::clone(&service), settings());

    let result = core.request_reply(&message("hi")).await;

    assert!(matches!(result, Err(ChannelError::Service(_))));
    assert_eq!(service.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn service_err_field_is_retried() {
    let service = ScriptedService::scripted(vec![Ok(ChatEnvelope::error("rate limited"))], "ok");
    let core = core_with(Arc::clone(&service), settings());

    let reply = core.request_reply(&message("hi")).await.expect("reply");

    assert_eq!(reply, "ok");
    assert_eq!(service.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_envelope_is_not_retried() {
    let service = ScriptedService::scripted(vec![Ok(ChatEnvelope::default())], "unused");
    let core = core_with(Arc::clone(&service), settings());

    let result = core.request_reply(&message("hi")).await;

    assert!(matches!(result, Err(ChannelError::InvalidResponse { .. })));
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn custom_policy_limits_attempts() {
    let service = ScriptedService::failing();
    let core = core_with(
        Arc::clone(&service),
        AdapterSettings {
            retry: RetryPolicy::none(),
            ..settings()
        },
    );

    let result = core.request_reply(&message("hi")).await;

    assert!(result.is_err());
    assert_eq!(service.calls(), 1);
}

#[tokio::test]
async fn request_carries_adapter_defaults() {
    let service = ScriptedService::replying("ok");
    let core = core_with(Arc::clone(&service), settings());

    core.request_reply(&message("where is my order"))
        .await
        .expect("reply");

    let request = &service.requests()[0];
    assert_eq!(request.bot_id, "bot-7");
    assert_eq!(request.message, "where is my order");
    assert_eq!(request.chat_id, "telegram-u-1");
    assert_eq!(request.channel, "telegram");
    assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(request.source_ids, vec!["faq"]);
    assert_eq!(request.tags, vec!["support"]);
    assert_eq!(request.top, Some(5));
    assert_eq!(request.max_reply_tokens, Some(300));
    assert!(!request.stream);
}

#[tokio::test]
async fn per_call_options_override_field_by_field() {
    let service = ScriptedService::replying("ok");
    let core = core_with(Arc::clone(&service), settings());
    let options = ReplyOptions {
        model: Some("claude-haiku".to_owned()),
        top: Some(1),
        ..ReplyOptions::default()
    };

    core.request_reply_with(&message("hi"), &options)
        .await
        .expect("reply");

    let request = &service.requests()[0];
    assert_eq!(request.model.as_deref(), Some("claude-haiku"));
    assert_eq!(request.top, Some(1));
    assert_eq!(request.tags, vec!["support"]);
    assert_eq!(request.max_reply_tokens, Some(300));
}

#[tokio::test]
async fn missing_reply_service_is_a_configuration_error() {
    let core = AdapterCore::new("telegram", settings(), None).expect("core");
    let result = core.request_reply(&message("hi")).await;
    assert!(matches!(result, Err(ChannelError::Configuration { .. })));
}

#[test]
fn blank_channel_name_is_rejected() {
    let result = AdapterCore::new("  ", AdapterSettings::default(), None);
    assert!(matches!(result, Err(ChannelError::Configuration { .. })));
}
