//! WhatsApp adapter lifecycle and inbound flow against a mock bridge.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard::adapter::{AdapterSettings, ChannelAdapter};
use switchboard::router::{Router, RouterOptions};
use switchboard::whatsapp::{WhatsAppAdapter, WhatsAppConfig};
use switchboard::ChannelError;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::ScriptedService;

fn adapter(server: &MockServer, allowed: &[&str]) -> WhatsAppAdapter {
    WhatsAppAdapter::new(
        WhatsAppConfig {
            bridge_url: server.uri(),
            allowed_contacts: allowed.iter().map(|c| (*c).to_owned()).collect(),
            health_retries: 1,
        },
        AdapterSettings {
            bot_id: Some("bot-wa".to_owned()),
            ..AdapterSettings::default()
        },
        None,
    )
    .expect("adapter")
}

async fn mount_connected_status(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "connected": true, "phone_number": "15550000000" }
        })))
        .mount(server)
        .await;
}

async fn mount_idle_poll(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/events/poll"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(server)
        .await;
}

async fn mount_send_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "message_id": "wa-1" }
        })))
        .mount(server)
        .await;
}

async fn sends_to(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/send")
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

#[tokio::test]
async fn start_fails_when_bridge_is_not_connected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "connected": false }
        })))
        .mount(&server)
        .await;

    let adapter = adapter(&server, &[]);
    let result = adapter.start().await;

    assert!(matches!(result, Err(ChannelError::Connection { .. })));
    assert!(!adapter.status().is_started);
}

#[tokio::test]
async fn start_then_stop_toggles_status() {
    let server = MockServer::start().await;
    mount_connected_status(&server).await;
    mount_idle_poll(&server).await;

    let adapter = adapter(&server, &[]);
    adapter.start().await.expect("start");
    assert!(adapter.status().is_started);

    adapter.stop().await.expect("stop");
    adapter.stop().await.expect("second stop");
    assert!(!adapter.status().is_started);
}

#[tokio::test]
async fn inbound_message_gets_service_reply() {
    let server = MockServer::start().await;
    mount_connected_status(&server).await;
    Mock::given(method("GET"))
        .and(path("/events/poll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "type": "message", "jid": "1555@s.whatsapp.net", "text": "hi", "push_name": "Grace" },
            { "type": "message", "jid": "1555@s.whatsapp.net", "text": "echo", "from_me": true }
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_idle_poll(&server).await;
    mount_send_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/typing"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let service = ScriptedService::replying("Hi Grace!");
    let router = Router::new(Arc::<ScriptedService>::clone(&service), RouterOptions::default());
    router
        .register(Arc::new(adapter(&server, &[])))
        .expect("register");
    router.start().await.expect("start");

    let mut sent = Vec::new();
    for _ in 0..50 {
        sent = sends_to(&server).await;
        if !sent.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    router.stop().await;

    assert_eq!(
        sent,
        vec![json!({ "jid": "1555@s.whatsapp.net", "text": "Hi Grace!" })]
    );
    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].chat_id, "whatsapp-1555");
    assert_eq!(requests[0].message, "hi");
}

#[tokio::test]
async fn send_message_accepts_bare_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(json!({ "jid": "1555@s.whatsapp.net" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "message_id": "wa-7" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter(&server, &[]);
    let result = adapter.send_message("1555", "parcel arrived").await.expect("send");

    assert_eq!(result.channel, "whatsapp");
    assert_eq!(result.recipient, "1555");
    assert_eq!(result.message_id.as_deref(), Some("wa-7"));
}

#[tokio::test]
async fn send_failure_is_delivery_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = adapter(&server, &[]);
    let result = adapter.send_message("1555", "hello").await;

    assert!(matches!(
        result,
        Err(ChannelError::Delivery { ref recipient, .. }) if recipient == "1555"
    ));
}

#[tokio::test]
async fn broadcast_reaches_every_allowed_contact() {
    let server = MockServer::start().await;
    mount_send_ok(&server).await;

    let adapter = adapter(&server, &["1555", "1666"]);
    adapter.broadcast("store closes early").await.expect("broadcast");

    let sent = sends_to(&server).await;
    let jids: Vec<_> = sent.iter().map(|b| b["jid"].clone()).collect();
    assert_eq!(
        jids,
        vec![json!("1555@s.whatsapp.net"), json!("1666@s.whatsapp.net")]
    );
}

#[tokio::test]
async fn broadcast_without_allow_list_is_rejected() {
    let server = MockServer::start().await;
    let adapter = adapter(&server, &[]);
    let result = adapter.broadcast("hello").await;
    assert!(matches!(result, Err(ChannelError::Configuration { .. })));
}

#[test]
fn status_reports_allow_list() {
    let adapter = WhatsAppAdapter::new(
        WhatsAppConfig {
            allowed_contacts: vec!["1555".to_owned()],
            ..WhatsAppConfig::default()
        },
        AdapterSettings::default(),
        None,
    )
    .expect("adapter");

    let status = adapter.status();
    assert_eq!(status.channel, "whatsapp");
    assert_eq!(status.extra["allowed_contacts"], json!(1));
    assert_eq!(status.extra["has_allow_list"], json!(true));
}

#[test]
fn empty_bridge_url_is_rejected() {
    let result = WhatsAppAdapter::new(
        WhatsAppConfig {
            bridge_url: String::new(),
            ..WhatsAppConfig::default()
        },
        AdapterSettings::default(),
        None,
    );
    assert!(matches!(result, Err(ChannelError::Configuration { .. })));
}
