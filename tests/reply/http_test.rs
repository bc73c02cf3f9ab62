//! HTTP reply service against a mock endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard::adapter::{AdapterCore, AdapterSettings};
use switchboard::message::{Metadata, NormalizedMessage};
use switchboard::reply::http::HttpReplyService;
use switchboard::reply::retry::RetryPolicy;
use switchboard::reply::{ChatRequest, ReplyService, ReplyServiceError};
use switchboard::ChannelError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ChatRequest {
    ChatRequest {
        bot_id: "bot-1".to_owned(),
        model: None,
        provider_key: None,
        message: "hi".to_owned(),
        source_ids: Vec::new(),
        tags: Vec::new(),
        top: None,
        max_reply_tokens: None,
        chat_id: "telegram-42".to_owned(),
        channel: "telegram".to_owned(),
        stream: false,
    }
}

fn service(server: &MockServer) -> HttpReplyService {
    HttpReplyService::new(server.uri(), "test-key", "proj-1", Duration::from_secs(5))
        .expect("valid service")
}

#[tokio::test]
async fn posts_request_with_bearer_and_project() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "bot_id": "bot-1",
            "project_id": "proj-1",
            "chat_id": "telegram-42",
            "channel": "telegram",
            "stream": false,
            "message": "hi",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "chat": { "reply": "Hello there" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = service(&server).chat(&request()).await.expect("chat");

    assert_eq!(envelope.reply_text(), Some("Hello there"));
    assert!(envelope.service_error().is_none());
}

#[tokio::test]
async fn err_field_is_surfaced_in_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "err": "bot not found"
        })))
        .mount(&server)
        .await;

    let envelope = service(&server).chat(&request()).await.expect("chat");

    assert_eq!(envelope.service_error(), Some(&json!("bot not found")));
    assert!(envelope.reply_text().is_none());
}

#[tokio::test]
async fn error_status_becomes_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let result = service(&server).chat(&request()).await;

    match result {
        Err(ReplyServiceError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "chat": { "reply": 42 } }
        })))
        .mount(&server)
        .await;

    let result = service(&server).chat(&request()).await;

    match result {
        Err(e @ ReplyServiceError::Malformed(_)) => assert!(!e.is_transient()),
        other => panic!("expected malformed body error, got {other:?}"),
    }
}

#[tokio::test]
async fn mistyped_reply_is_invalid_response_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": { "chat": { "reply": 42 } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend: Arc<dyn ReplyService> = Arc::new(service(&server));
    let settings = AdapterSettings {
        bot_id: Some("bot-1".to_owned()),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        ..AdapterSettings::default()
    };
    let core = AdapterCore::new("telegram", settings, Some(backend)).expect("core");
    let message = NormalizedMessage::new("hi", "42", None, Metadata::new()).expect("message");

    let result = core.request_reply(&message).await;

    assert!(
        matches!(result, Err(ChannelError::InvalidResponse { .. })),
        "got {result:?}"
    );
}

#[tokio::test]
async fn non_object_success_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/bot/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "x" })))
        .expect(1)
        .mount(&server)
        .await;

    let backend: Arc<dyn ReplyService> = Arc::new(service(&server));
    let settings = AdapterSettings {
        bot_id: Some("bot-1".to_owned()),
        ..AdapterSettings::default()
    };
    let core = AdapterCore::new("telegram", settings, Some(backend)).expect("core");
    let message = NormalizedMessage::new("hi", "42", None, Metadata::new()).expect("message");

    let result = core.request_reply(&message).await;

    assert!(matches!(result, Err(ChannelError::InvalidResponse { .. })));
}

#[test]
fn project_id_is_reported() {
    let service = HttpReplyService::new(
        "https://example.invalid/",
        "k",
        "proj-9",
        Duration::from_secs(1),
    )
    .expect("valid service");
    assert_eq!(service.project_id(), Some("proj-9"));
    assert_eq!(service.base_url(), "https://example.invalid");
}

#[test]
fn missing_key_or_project_is_rejected() {
    let no_key = HttpReplyService::new("https://x", " ", "p", Duration::from_secs(1));
    assert!(matches!(no_key, Err(ChannelError::Configuration { .. })));
    let no_project = HttpReplyService::new("https://x", "k", "", Duration::from_secs(1));
    assert!(matches!(no_project, Err(ChannelError::Configuration { .. })));
}

#[test]
fn debug_output_hides_api_key() {
    let service = HttpReplyService::new("https://x", "sk-secret", "p", Duration::from_secs(1))
        .expect("valid service");
    assert!(!format!("{service:?}").contains("sk-secret"));
}
