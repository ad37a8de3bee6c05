// tests/integration/hub_test.rs

//! Runs a hub on an ephemeral port and exercises the fan-out, including the
//! full publish round trip through a gateway's upstream link.

use super::test_helpers::{drain, init_tracing, payload};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tagrelay::core::events::GatewayEvent;
use tagrelay::core::hooks::GatewayHooks;
use tagrelay::core::protocol::DispatchCommand;
use tagrelay::core::pubsub::ClientSink;
use tagrelay::core::state::{CoreSettings, GatewayCore};
use tagrelay::core::upstream::{Connector, LinkManager, LinkState, TcpConnector};
use tagrelay::hub::Hub;
use tagrelay::hub::config::HubConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::broadcast;

async fn start_hub() -> (SocketAddr, broadcast::Sender<()>) {
    init_tracing();
    let config = HubConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..HubConfig::default()
    };
    let hub = Hub::bind(&config).await.unwrap();
    let addr = hub.local_addr().unwrap();
    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(hub.run(shutdown_tx.subscribe()));
    (addr, shutdown_tx)
}

async fn next_command(lines: &mut tokio::io::Lines<BufReader<OwnedReadHalf>>) -> DispatchCommand {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for a command")
        .unwrap()
        .expect("link closed");
    DispatchCommand::decode(&line).unwrap()
}

#[tokio::test]
async fn test_hub_fans_out_to_every_link_including_sender() {
    let (addr, shutdown_tx) = start_hub().await;

    let (a_read, mut a_write) = TcpStream::connect(addr).await.unwrap().into_split();
    let (b_read, _b_write) = TcpStream::connect(addr).await.unwrap().into_split();
    let mut a_lines = BufReader::new(a_read).lines();
    let mut b_lines = BufReader::new(b_read).lines();

    // Give the hub a moment to subscribe both links.
    tokio::time::sleep(Duration::from_millis(100)).await;

    a_write
        .write_all(b"this is not json\n\xff\xfe\n{\"type\":\"send_by_tag\",\"tags\":\"news\",\"content\":\"X\"}\n")
        .await
        .unwrap();

    let expected = DispatchCommand::send_by_tags(["news"], "X");
    assert_eq!(next_command(&mut a_lines).await, expected);
    assert_eq!(next_command(&mut b_lines).await, expected);

    shutdown_tx.send(()).unwrap();
}

#[tokio::test]
async fn test_publish_round_trips_through_hub_to_local_clients() {
    let (addr, shutdown_tx) = start_hub().await;

    let (core, handle) = GatewayCore::new(CoreSettings::default(), GatewayHooks::new());
    tokio::spawn(core.run(shutdown_tx.subscribe()));

    let connector: Arc<dyn Connector> = Arc::new(TcpConnector::new(1024 * 1024));
    let (links, workers) = LinkManager::new(
        &[addr.to_string()],
        connector,
        Duration::from_millis(100),
        64,
        handle.sender(),
    );
    for worker in workers {
        tokio::spawn(worker.run(shutdown_tx.subscribe()));
    }

    let mut state = links.watch(&addr.to_string()).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == LinkState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let (sink, mut rx) = ClientSink::channel(1, 16);
    handle
        .sender()
        .send(GatewayEvent::ClientConnected {
            id: 1,
            addr: None,
            sink,
            query: HashMap::from([("tags".to_string(), "news".to_string())]),
        })
        .await
        .unwrap();

    // LinkUp may still be in flight behind the state change; retry until accepted.
    let mut published = false;
    for _ in 0..50 {
        if handle.send_by_keys(["news"], "hello").await.is_ok() {
            published = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(published);

    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, payload("hello"));
    assert!(drain(&mut rx).is_empty());

    shutdown_tx.send(()).unwrap();
}
