//! Server wiring tests with audio disabled

use futures_util::{SinkExt, StreamExt};
use octopid_server::{OctopidConfig, OctopidServer};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

fn test_config() -> OctopidConfig {
    let mut config = OctopidConfig::default();
    config.audio.enabled = false;
    config.demo.slice_interval_ms = 10;
    config.demo.slices_per_mood = 2;
    config
}

#[tokio::test]
async fn test_serves_commands_and_shuts_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let server = OctopidServer::new(test_config());
    let control = server.control().clone();
    let handle = tokio::spawn(server.run_on(listener, shutdown.clone()));

    let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    client
        .send(Message::Text(r#"{"type":"mood","mood":"innocent"}"#.to_string()))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame, Message::Text(r#"{"type":"mood","mood":"innocent"}"#.to_string()));

    // Audio stays usable in the flag sense even without a capture device
    assert!(!control.is_capture_faulted());

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap();
    tokio_test::assert_ok!(result);
}

#[tokio::test]
async fn test_shutdown_finalizes_running_demo() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let mut config = test_config();
    config.demo.slices_per_mood = 500;
    let server = OctopidServer::new(config);
    let control = server.control().clone();
    let handle = tokio::spawn(server.run_on(listener, shutdown.clone()));

    let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    client
        .send(Message::Text(r#"{"type":"demo","command":"start"}"#.to_string()))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !control.is_demo_running() {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop after shutdown")
        .unwrap()
        .unwrap();
    assert!(!control.is_demo_running());
}
