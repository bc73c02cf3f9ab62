//! Out-of-band sends, broadcast and status.

use std::sync::Arc;

use switchboard::router::{Router, RouterOptions};
use switchboard::ChannelError;

use crate::support::{MockAdapter, ScriptedService};

fn router() -> Router {
    Router::new(ScriptedService::replying("ok"), RouterOptions::default())
}

#[tokio::test]
async fn send_message_goes_to_named_adapter_only() {
    let router = router();
    let (a, a_dyn) = MockAdapter::new("a").shared();
    let (b, b_dyn) = MockAdapter::new("b").shared();
    router.register(a_dyn).expect("register a");
    router.register(b_dyn).expect("register b");

    let result = router
        .send_message("b", "chat-9", "order shipped")
        .await
        .expect("send");

    assert_eq!(result.channel, "b");
    assert_eq!(result.recipient, "chat-9");
    assert_eq!(result.message_id.as_deref(), Some("m-1"));
    assert!(a.sent().is_empty());
    assert_eq!(b.sent(), vec![("chat-9".to_owned(), "order shipped".to_owned())]);
}

#[tokio::test]
async fn send_message_to_unknown_channel_is_not_found() {
    let router = router();
    router
        .register(Arc::new(MockAdapter::new("a")))
        .expect("register");

    let result = router.send_message("discord", "x", "hello").await;

    match result {
        Err(err @ ChannelError::NotFound { .. }) => {
            assert_eq!(err.to_string(), "adapter for channel \"discord\" not found");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn send_message_propagates_delivery_failure() {
    let router = router();
    router
        .register(Arc::new(MockAdapter::new("a").failing_send()))
        .expect("register");

    let result = router.send_message("a", "chat-1", "hello").await;

    assert!(matches!(result, Err(ChannelError::Delivery { .. })));
}

#[tokio::test]
async fn broadcast_with_empty_list_targets_every_adapter() {
    let router = router();
    let (a, a_dyn) = MockAdapter::new("a").broadcasting().shared();
    let (_b, b_dyn) = MockAdapter::new("b").shared();
    let (_c, c_dyn) = MockAdapter::new("c").broadcasting().failing_send().shared();
    router.register(a_dyn).expect("register a");
    router.register(b_dyn).expect("register b");
    router.register(c_dyn).expect("register c");

    let results = router.broadcast("maintenance at noon", &[]).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].channel, "a");
    assert!(results[0].success);
    assert_eq!(results[1].channel, "b");
    assert!(!results[1].success);
    assert_eq!(results[1].reason.as_deref(), Some("broadcast not supported"));
    assert_eq!(results[2].channel, "c");
    assert!(!results[2].success);
    assert!(results[2].error.is_some());
    assert_eq!(a.broadcasts(), vec!["maintenance at noon"]);
}

#[tokio::test]
async fn broadcast_with_names_targets_only_those() {
    let router = router();
    let (a, a_dyn) = MockAdapter::new("a").broadcasting().shared();
    let (b, b_dyn) = MockAdapter::new("b").broadcasting().shared();
    router.register(a_dyn).expect("register a");
    router.register(b_dyn).expect("register b");

    let results = router.broadcast("hi", &["b", "nonexistent"]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].channel, "b");
    assert!(a.broadcasts().is_empty());
    assert_eq!(b.broadcasts(), vec!["hi"]);
}

#[tokio::test]
async fn status_lists_adapters_in_registration_order() {
    let router = router();
    router
        .register(Arc::new(MockAdapter::new("z")))
        .expect("register z");
    router
        .register(Arc::new(MockAdapter::new("m")))
        .expect("register m");

    let status = router.status();
    assert!(!status.is_started);
    let channels: Vec<_> = status.adapters.iter().map(|s| s.channel.as_str()).collect();
    assert_eq!(channels, vec!["z", "m"]);
    assert!(status.adapters.iter().all(|s| !s.is_started));
}
