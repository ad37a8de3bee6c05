// tests/integration/gateway_test.rs

//! Drives the gateway core through client, link and publish events.

use super::test_helpers::{LINK, RecordingHook, TestContext, drain, payload};
use std::sync::{Arc, Mutex};
use tagrelay::core::RelayError;
use tagrelay::core::events::GatewayEvent;
use tagrelay::core::hooks::GatewayHooks;
use tagrelay::core::ingress::{Ingress, IngressPolicy, SubscriptionMode};
use tagrelay::core::metrics;
use tagrelay::core::protocol::{DispatchCommand, Payload};
use tagrelay::core::pubsub::Outbound;
use tagrelay::core::state::{CoreSettings, GatewayCore};
use tokio::sync::{broadcast, mpsc, oneshot};

#[tokio::test]
async fn test_overlapping_subscriptions_receive_each_command_once() {
    let mut ctx = TestContext::new();
    let mut c1 = ctx.connect(1, Some("sports,news"));
    let mut c2 = ctx.connect(2, Some("news"));

    ctx.upstream(DispatchCommand::send_by_tags(["sports", "news"], "X"));

    assert_eq!(drain(&mut c1), vec![payload("X")]);
    assert_eq!(drain(&mut c2), vec![payload("X")]);
    assert_eq!(ctx.core.stats().last_seq, 1);
}

#[tokio::test]
async fn test_message_subscription_merges_by_default() {
    let mut ctx = TestContext::new();
    let mut c1 = ctx.connect(1, Some("sports"));
    ctx.message(1, r#"{"type":"subscribe","tags":"news"}"#);

    ctx.upstream(DispatchCommand::send_by_tags(["sports"], "S"));
    ctx.upstream(DispatchCommand::send_by_tags(["news"], "N"));

    assert_eq!(drain(&mut c1), vec![payload("S"), payload("N")]);
    assert_eq!(ctx.core.stats().topics, 2);
}

#[tokio::test]
async fn test_replace_mode_drops_old_keys() {
    let settings = CoreSettings {
        subscription_mode: SubscriptionMode::Replace,
        ..CoreSettings::default()
    };
    let mut ctx = TestContext::with_settings(settings, GatewayHooks::new());
    let mut c1 = ctx.connect(1, Some("sports"));
    ctx.message(1, r#"{"tags":["news"]}"#);

    ctx.upstream(DispatchCommand::send_by_tags(["sports"], "S"));
    ctx.upstream(DispatchCommand::send_by_tags(["news"], "N"));

    assert_eq!(drain(&mut c1), vec![payload("N")]);
    assert!(!ctx.core.index().is_subscribed("sports", 1));
}

#[tokio::test]
async fn test_broadcast_and_empty_tag_fallback_reach_everyone() {
    let mut ctx = TestContext::new();
    let mut c1 = ctx.connect(1, None);
    let mut c2 = ctx.connect(2, Some("news"));

    ctx.upstream(DispatchCommand::send_to_all("A"));
    ctx.upstream(DispatchCommand::send_by_tags(Vec::<String>::new(), "B"));

    assert_eq!(drain(&mut c1), vec![payload("A"), payload("B")]);
    assert_eq!(drain(&mut c2), vec![payload("A"), payload("B")]);
}

#[tokio::test]
async fn test_lenient_ignores_non_subscription_messages() {
    let mut ctx = TestContext::new();
    let mut c1 = ctx.connect(1, Some("a"));
    ctx.message(1, "hello there");
    ctx.message(1, r#"{"chat":"hi"}"#);

    assert!(ctx.core.registry().contains(1));
    assert!(drain(&mut c1).is_empty());
    assert!(ctx.core.index().is_subscribed("a", 1));
}

#[tokio::test]
async fn test_strict_violation_closes_and_deregisters() {
    let settings = CoreSettings {
        ingress: Ingress::new(IngressPolicy::Strict, "tags"),
        ..CoreSettings::default()
    };
    let mut ctx = TestContext::with_settings(settings, GatewayHooks::new());
    let mut c1 = ctx.connect(1, Some("a"));

    ctx.message(1, "not json");

    let frames = drain(&mut c1);
    assert!(matches!(frames.as_slice(), [Outbound::Close(_)]));
    assert!(!ctx.core.registry().contains(1));
    assert_eq!(ctx.core.index().topic_count(), 0);
}

#[tokio::test]
async fn test_close_is_idempotent_and_cleans_index() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks = GatewayHooks::new().with(Arc::new(RecordingHook {
        name: "h",
        calls: calls.clone(),
    }));
    let mut ctx = TestContext::with_settings(CoreSettings::default(), hooks);
    let _c1 = ctx.connect(1, Some("a,b"));

    ctx.close(1);
    ctx.close(1);

    assert_eq!(ctx.core.index().topic_count(), 0);
    assert_eq!(ctx.core.stats().clients, 0);
    let closes = calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.contains(":close:"))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_failed_recipient_is_cleaned_up_and_others_still_receive() {
    let mut ctx = TestContext::new();
    let c1 = ctx.connect(1, Some("news"));
    let mut c2 = ctx.connect(2, Some("news"));
    drop(c1);

    ctx.upstream(DispatchCommand::send_by_tags(["news"], "X"));

    assert_eq!(drain(&mut c2), vec![payload("X")]);
    assert!(!ctx.core.registry().contains(1));
    assert_eq!(ctx.core.index().subscriber_count("news"), 1);
}

#[tokio::test]
async fn test_hooks_run_in_order_after_bookkeeping() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let hooks = GatewayHooks::new()
        .with(Arc::new(RecordingHook {
            name: "first",
            calls: calls.clone(),
        }))
        .with(Arc::new(RecordingHook {
            name: "second",
            calls: calls.clone(),
        }));
    let mut ctx = TestContext::with_settings(CoreSettings::default(), hooks);

    let _c1 = ctx.connect(1, Some("sports"));
    ctx.message(1, r#"{"tags":"news"}"#);
    ctx.close(1);

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            "first:connect:1:sports",
            "second:connect:1:sports",
            r#"first:message:1:{"tags":"news"}"#,
            r#"second:message:1:{"tags":"news"}"#,
            "first:close:1",
            "second:close:1",
        ]
    );
}

#[tokio::test]
async fn test_heartbeat_reaches_all_clients_without_consuming_sequence() {
    let settings = CoreSettings {
        heartbeat_payload: Some(Payload::from("ping")),
        ..CoreSettings::default()
    };
    let mut ctx = TestContext::with_settings(settings, GatewayHooks::new());
    let mut c1 = ctx.connect(1, None);
    let mut c2 = ctx.connect(2, Some("a"));

    ctx.core.handle_event(GatewayEvent::Heartbeat);

    assert_eq!(drain(&mut c1), vec![payload("ping")]);
    assert_eq!(drain(&mut c2), vec![payload("ping")]);
    assert_eq!(ctx.core.stats().last_seq, 0);
}

#[tokio::test]
async fn test_publish_without_link_is_not_ready_and_not_buffered() {
    let (core, handle) = GatewayCore::new(CoreSettings::default(), GatewayHooks::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    let task = tokio::spawn(core.run(shutdown_tx.subscribe()));

    assert_eq!(handle.send_to_all("early").await, Err(RelayError::NotReady));

    let (writer, mut written) = mpsc::channel(16);
    handle
        .sender()
        .send(GatewayEvent::LinkUp {
            address: LINK.to_string(),
            writer,
        })
        .await
        .unwrap();

    assert_eq!(handle.send_by_keys(["news"], "late").await, Ok(1));
    assert_eq!(
        written.recv().await,
        Some(DispatchCommand::send_by_tags(["news"], "late"))
    );
    // The earlier publish was not replayed.
    assert!(written.try_recv().is_err());
    assert_eq!(handle.stats().await.unwrap().connected_links, 1);

    handle
        .sender()
        .send(GatewayEvent::LinkDown {
            address: LINK.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(handle.send_to_all("gone").await, Err(RelayError::NotReady));

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
    assert_eq!(handle.stats().await, Err(RelayError::GatewayStopped));
}

#[tokio::test]
async fn test_publish_fans_out_to_every_connected_link() {
    let mut ctx = TestContext::new();
    let mut first = ctx.link_up();
    let mut second = ctx.link_up_with_buffer("other:2015", 16);

    let (reply, rx) = oneshot::channel();
    ctx.core.handle_event(GatewayEvent::Publish {
        command: DispatchCommand::send_to_all("hi"),
        reply,
    });

    assert_eq!(rx.await.unwrap(), Ok(2));
    assert_eq!(first.try_recv(), Ok(DispatchCommand::send_to_all("hi")));
    assert_eq!(second.try_recv(), Ok(DispatchCommand::send_to_all("hi")));

    ctx.link_down();
    assert_eq!(ctx.core.stats().connected_links, 1);
}

#[tokio::test]
async fn test_publish_skips_links_whose_write_queue_is_full() {
    let mut ctx = TestContext::new();
    let mut stalled = ctx.link_up_with_buffer(LINK, 1);

    let publish = |ctx: &mut TestContext, content: &str| {
        let (reply, mut rx) = oneshot::channel();
        ctx.core.handle_event(GatewayEvent::Publish {
            command: DispatchCommand::send_to_all(content),
            reply,
        });
        rx.try_recv().unwrap()
    };

    assert_eq!(publish(&mut ctx, "first"), Ok(1));
    // The backend has not read "first", so the only link cannot take more.
    assert_eq!(publish(&mut ctx, "second"), Err(RelayError::NotReady));
    assert_eq!(ctx.core.stats().connected_links, 1);

    // A second link with room still receives publishes.
    let mut healthy = ctx.link_up_with_buffer("other:2015", 4);
    assert_eq!(publish(&mut ctx, "third"), Ok(1));
    assert_eq!(healthy.try_recv(), Ok(DispatchCommand::send_to_all("third")));

    // Draining the stalled link makes it writable again.
    assert_eq!(stalled.try_recv(), Ok(DispatchCommand::send_to_all("first")));
    assert_eq!(publish(&mut ctx, "fourth"), Ok(2));
}

#[tokio::test]
async fn test_dispatch_metric_is_labeled_by_link() {
    let mut ctx = TestContext::new();
    let _c1 = ctx.connect(1, None);
    let address = "metrics-label-test:2015";
    let counter = metrics::DISPATCH_COMMANDS_TOTAL.with_label_values(&["send_to_all", address]);
    let before = counter.get();

    ctx.core.handle_event(GatewayEvent::LinkCommand {
        address: address.to_string(),
        command: DispatchCommand::send_to_all("m"),
    });
    ctx.core.handle_event(GatewayEvent::LinkCommand {
        address: address.to_string(),
        command: DispatchCommand::send_to_all("n"),
    });

    assert_eq!(counter.get() - before, 2.0);
}
