// tests/integration/websocket_test.rs

//! End-to-end tests over a real WebSocket listener.

use super::test_helpers::{LINK, init_tracing};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tagrelay::core::events::GatewayEvent;
use tagrelay::core::hooks::GatewayHooks;
use tagrelay::core::ingress::{Ingress, IngressPolicy};
use tagrelay::core::protocol::DispatchCommand;
use tagrelay::core::state::{CoreSettings, GatewayCore, GatewayHandle};
use tagrelay::server::{AppState, router};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

struct Gateway {
    addr: SocketAddr,
    handle: GatewayHandle,
    shutdown_tx: broadcast::Sender<()>,
}

async fn start_gateway(settings: CoreSettings, max_clients: usize) -> Gateway {
    init_tracing();
    let (core, handle) = GatewayCore::new(settings, GatewayHooks::new());
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(core.run(shutdown_tx.subscribe()));

    let app = router(
        AppState {
            events_tx: handle.sender(),
            client_buffer: 64,
            permits: Arc::new(Semaphore::new(max_clients)),
            shutdown_tx: shutdown_tx.clone(),
        },
        "/",
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    Gateway {
        addr,
        handle,
        shutdown_tx,
    }
}

async fn wait_for_clients(handle: &GatewayHandle, expected: usize) {
    for _ in 0..100 {
        if handle.stats().await.unwrap().clients == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("gateway never reached {expected} client(s)");
}

async fn upstream(handle: &GatewayHandle, command: DispatchCommand) {
    handle
        .sender()
        .send(GatewayEvent::LinkCommand {
            address: LINK.to_string(),
            command,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_query_subscription_and_targeted_delivery() {
    let gw = start_gateway(CoreSettings::default(), 16).await;

    let (mut sports, _) = connect_async(format!("ws://{}/?tags=sports,news", gw.addr))
        .await
        .unwrap();
    let (mut weather, _) = connect_async(format!("ws://{}/?tags=weather", gw.addr))
        .await
        .unwrap();
    wait_for_clients(&gw.handle, 2).await;

    upstream(
        &gw.handle,
        DispatchCommand::send_by_tags(["sports", "news"], "goal"),
    )
    .await;
    upstream(&gw.handle, DispatchCommand::send_to_all("everyone")).await;

    let first = sports.next().await.unwrap().unwrap();
    assert_eq!(first.into_text().unwrap().as_str(), "goal");
    let second = sports.next().await.unwrap().unwrap();
    assert_eq!(second.into_text().unwrap().as_str(), "everyone");

    // The weather client only sees the broadcast.
    let only = weather.next().await.unwrap().unwrap();
    assert_eq!(only.into_text().unwrap().as_str(), "everyone");

    gw.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_message_subscription_over_socket() {
    let gw = start_gateway(CoreSettings::default(), 16).await;

    let (mut client, _) = connect_async(format!("ws://{}/", gw.addr)).await.unwrap();
    client
        .send(Message::Text(r#"{"type":"subscribe","tags":"news"}"#.into()))
        .await
        .unwrap();

    for _ in 0..100 {
        if gw.handle.stats().await.unwrap().topics == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    upstream(&gw.handle, DispatchCommand::send_by_tags(["news"], "N")).await;
    let frame = client.next().await.unwrap().unwrap();
    assert_eq!(frame.into_text().unwrap().as_str(), "N");

    gw.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_disconnect_deregisters_client() {
    let gw = start_gateway(CoreSettings::default(), 16).await;

    let (mut client, _) = connect_async(format!("ws://{}/?tags=a", gw.addr))
        .await
        .unwrap();
    wait_for_clients(&gw.handle, 1).await;

    client.close(None).await.unwrap();
    wait_for_clients(&gw.handle, 0).await;
    assert_eq!(gw.handle.stats().await.unwrap().topics, 0);

    gw.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_strict_violation_closes_with_policy_code() {
    let settings = CoreSettings {
        ingress: Ingress::new(IngressPolicy::Strict, "tags"),
        ..CoreSettings::default()
    };
    let gw = start_gateway(settings, 16).await;

    let (mut client, _) = connect_async(format!("ws://{}/", gw.addr)).await.unwrap();
    client.send(Message::Text("hello".into())).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        Message::Close(Some(close)) => assert_eq!(close.code, CloseCode::Policy),
        other => panic!("expected close frame, got {other:?}"),
    }
    wait_for_clients(&gw.handle, 0).await;

    gw.shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_max_clients_refuses_excess_upgrades() {
    let gw = start_gateway(CoreSettings::default(), 1).await;

    let (_first, _) = connect_async(format!("ws://{}/", gw.addr)).await.unwrap();
    wait_for_clients(&gw.handle, 1).await;

    let refused = connect_async(format!("ws://{}/", gw.addr)).await;
    assert!(refused.is_err());

    gw.shutdown_tx.send(()).unwrap();
}
