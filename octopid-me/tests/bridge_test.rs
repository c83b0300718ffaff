//! End-to-end WebSocket tests against a bridge on an ephemeral port

use futures_util::{SinkExt, StreamExt};
use octopid_core::{ControlState, MessageSink, Mood, ServerMessage};
use octopid_me::{AvatarBridge, AvatarError, BridgeConfig, CommandInterpreter, DemoConfig, DemoSequencer, SessionManager};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    control: Arc<ControlState>,
    sessions: Arc<SessionManager>,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn spawn_bridge() -> TestServer {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let control = Arc::new(ControlState::new());
    let sessions = Arc::new(SessionManager::new(control.clone()));
    let demo = Arc::new(DemoSequencer::new(
        sessions.clone(),
        control.clone(),
        DemoConfig {
            slice_interval_ms: 10,
            slices_per_mood: 5,
        },
    ));
    let interpreter = Arc::new(CommandInterpreter::new(sessions.clone(), control.clone(), demo));
    let bridge = AvatarBridge::new(BridgeConfig::default(), sessions.clone(), interpreter);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move { bridge.serve(listener, token).await });

    TestServer {
        addr,
        control,
        sessions,
        shutdown,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (client, _) = connect_async(format!("ws://{}/", server.addr)).await.unwrap();
    client
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next data or close frame, skipping pings
async fn next_frame(client: &mut Client) -> Option<Message> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")?;
        match frame {
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(message) => return Some(message),
            Err(_) => return None,
        }
    }
}

async fn next_json(client: &mut Client) -> Value {
    match next_frame(client).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_mood_round_trip() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;

    send(&mut client, r#"{"type":"mood","mood":"surprised"}"#).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "mood");
    assert_eq!(reply["mood"], "surprised");
}

#[tokio::test]
async fn test_newer_connection_evicts_older() {
    let server = spawn_bridge().await;
    let mut first = connect(&server).await;
    wait_until("first session", || server.sessions.has_session()).await;
    let first_id = server.sessions.active_id();

    let mut second = connect(&server).await;

    match next_frame(&mut first).await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(u16::from(frame.code), 1000);
            assert_eq!(frame.reason, "superseded by a newer connection");
        }
        other => panic!("expected a close frame, got {:?}", other),
    }
    wait_until("second session", || server.sessions.active_id() != first_id).await;

    server.sessions.send(ServerMessage::mood(Mood::Angry));
    let reply = next_json(&mut second).await;
    assert_eq!(reply["mood"], "angry");

    send(&mut second, r#"{"type":"mood","mood":"sleepy"}"#).await;
    assert_eq!(next_json(&mut second).await["mood"], "sleepy");
}

#[tokio::test]
async fn test_invalid_frames_keep_session_alive() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;

    send(&mut client, "definitely not json").await;
    send(&mut client, r#"{"type":"mood","mood":"ecstatic"}"#).await;
    client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    send(&mut client, &"x".repeat(70 * 1024)).await;
    send(&mut client, r#"{"type":"mood","mood":"worried"}"#).await;

    assert_eq!(next_json(&mut client).await["mood"], "worried");
}

#[tokio::test]
async fn test_huge_frame_is_refused_by_transport() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;
    wait_until("session", || server.sessions.has_session()).await;

    // Far past the configured limit: the connection fails instead of buffering it
    let _ = client.send(Message::Text("x".repeat(1024 * 1024))).await;

    wait_until("session dropped", || !server.sessions.has_session()).await;
}

#[tokio::test]
async fn test_audio_off_sends_reset_frame() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;

    send(&mut client, r#"{"type":"audio","command":"on"}"#).await;
    wait_until("audio enabled", || server.control.is_audio_enabled()).await;
    send(&mut client, r#"{"type":"audio","command":"off"}"#).await;

    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "audio");
    assert_eq!(reply["bass"], 0.0);
    assert!(reply.get("mids").is_none());
}

#[tokio::test]
async fn test_demo_then_manual_mood() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;

    send(&mut client, r#"{"type":"demo","command":"start"}"#).await;
    assert_eq!(next_json(&mut client).await["mood"], "happy");

    send(&mut client, r#"{"type":"mood","mood":"happy"}"#).await;
    assert_eq!(next_json(&mut client).await["mood"], "neutral");
    assert_eq!(next_json(&mut client).await["mood"], "happy");
    assert!(!server.control.is_demo_running());

    // No demo mood follows the manual one
    let quiet = tokio::time::timeout(Duration::from_millis(150), client.next()).await;
    assert!(quiet.is_err(), "unexpected frame {:?}", quiet);
}

#[tokio::test]
async fn test_disconnect_stops_demo() {
    let server = spawn_bridge().await;
    let mut client = connect(&server).await;

    send(&mut client, r#"{"type":"demo","command":"start"}"#).await;
    wait_until("demo running", || server.control.is_demo_running()).await;

    tokio_test::assert_ok!(client.close(None).await);
    drop(client);

    wait_until("session cleared", || !server.sessions.has_session()).await;
    wait_until("demo stopped", || !server.control.is_demo_running()).await;
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let control = Arc::new(ControlState::new());
    let sessions = Arc::new(SessionManager::new(control.clone()));
    let demo = Arc::new(DemoSequencer::new(sessions.clone(), control.clone(), DemoConfig::default()));
    let interpreter = Arc::new(CommandInterpreter::new(sessions.clone(), control, demo));
    let config = BridgeConfig {
        port: 0,
        ..BridgeConfig::default()
    };

    let bridge = AvatarBridge::new(config, sessions, interpreter);
    let result = bridge.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(AvatarError::Config(_))));
}
