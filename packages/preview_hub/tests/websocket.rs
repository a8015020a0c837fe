//! End-to-end checks against a real listener: connection acks, fan-out to
//! every viewer, per-connection errors and process streaming.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use preview_hub::config::{FileConfig, HubConfig, HubDirs};
use preview_hub::models::WorkspaceId;
use preview_hub::supervisor::SpawnRequest;
use preview_hub::{AppState, build_router};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: AppState,
    _tmp: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let dirs = HubDirs::new(Some(tmp.path().to_path_buf())).unwrap();
    let config = HubConfig::from_file(&FileConfig::default(), &dirs);
    let state = AppState::new(&config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        state,
        _tmp: tmp,
    }
}

async fn connect(server: &TestServer, path: &str) -> Client {
    let url = format!("ws://{}{}", server.addr, path);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Read until a `process-completed` for `process_id`, returning all events seen
async fn until_completed(ws: &mut Client, process_id: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    loop {
        let json = next_json(ws).await;
        let done = json["type"] == "process-completed" && json["processId"] == process_id;
        seen.push(json);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_ack_carries_client_count() {
    let server = start_server().await;

    let mut first = connect(&server, "/api/previews/demo/ws").await;
    let ack = next_json(&mut first).await;
    assert_eq!(ack["type"], "connection-established");
    assert_eq!(ack["previewId"], "demo");
    assert_eq!(ack["clientCount"], 1);

    let mut second = connect(&server, "/api/previews/demo/ws").await;
    let ack = next_json(&mut second).await;
    assert_eq!(ack["clientCount"], 2);

    // the workspace directory was created on attach
    assert!(server.state.registry.root().join("demo").is_dir());
}

#[tokio::test]
async fn test_file_change_fans_out_to_all_viewers() {
    let server = start_server().await;
    let mut a = connect(&server, "/api/previews/demo/ws").await;
    let mut b = connect(&server, "/api/previews/demo/ws").await;
    let mut other = connect(&server, "/api/previews/elsewhere/ws").await;
    next_json(&mut a).await;
    next_json(&mut b).await;
    next_json(&mut other).await;

    send_json(
        &mut a,
        serde_json::json!({ "type": "file-change", "previewId": "elsewhere", "path": "index.html" }),
    )
    .await;

    for ws in [&mut a, &mut b] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "refresh-preview");
        assert_eq!(msg["previewId"], "demo");
    }

    send_json(&mut a, serde_json::json!({ "type": "preview-ready" })).await;
    for ws in [&mut a, &mut b] {
        let msg = next_json(ws).await;
        assert_eq!(msg["type"], "preview-ready");
        assert_eq!(msg["url"], "/preview/demo/");
    }

    // the other workspace heard nothing; its first event is its own
    send_json(&mut other, serde_json::json!({ "type": "file-change" })).await;
    let msg = next_json(&mut other).await;
    assert_eq!(msg["type"], "refresh-preview");
    assert_eq!(msg["previewId"], "elsewhere");
}

#[tokio::test]
async fn test_malformed_frames_only_answer_the_sender() {
    let server = start_server().await;
    let mut a = connect(&server, "/api/previews/demo/ws").await;
    let mut b = connect(&server, "/api/previews/demo/ws").await;
    next_json(&mut a).await;
    next_json(&mut b).await;

    a.send(Message::Text("not json".into())).await.unwrap();
    let err = next_json(&mut a).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"], "invalid-argument");

    send_json(&mut a, serde_json::json!({ "type": "launch-missiles" })).await;
    assert_eq!(next_json(&mut a).await["type"], "error");

    a.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    assert_eq!(next_json(&mut a).await["type"], "error");

    // still open after errors
    send_json(&mut a, serde_json::json!({ "type": "file-change" })).await;
    assert_eq!(next_json(&mut a).await["type"], "refresh-preview");

    // b never saw the errors: its first event is the refresh
    assert_eq!(next_json(&mut b).await["type"], "refresh-preview");
}

#[tokio::test]
async fn test_process_output_reaches_every_viewer() {
    let server = start_server().await;
    let mut a = connect(&server, "/api/previews/demo/ws").await;
    let mut b = connect(&server, "/api/previews/demo/ws").await;
    next_json(&mut a).await;
    next_json(&mut b).await;

    let session = server
        .state
        .registry
        .get(&WorkspaceId::parse("demo").unwrap())
        .await
        .unwrap();
    let info = server
        .state
        .supervisor
        .spawn(&session, SpawnRequest::new("echo", &["hello"]))
        .await
        .unwrap();

    for ws in [&mut a, &mut b] {
        let events = until_completed(ws, &info.process_id).await;
        let completed = events.last().unwrap();
        assert_eq!(completed["exitCode"], 0);
        assert_eq!(completed["stdout"], "hello\n");
        assert!(
            events
                .iter()
                .any(|e| e["type"] == "process-output" && e["stream"] == "stdout")
        );
    }
}

#[tokio::test]
async fn test_terminal_input_defaults_to_subject_process() {
    let server = start_server().await;
    let id = WorkspaceId::parse("shell").unwrap();
    let session = server.state.registry.get_or_create(&id).await.unwrap();
    let info = server
        .state
        .supervisor
        .spawn(&session, SpawnRequest::new("sh", &[]).interactive())
        .await
        .unwrap();

    let path = format!("/api/previews/shell/ws?processId={}", info.process_id);
    let mut ws = connect(&server, &path).await;
    assert_eq!(next_json(&mut ws).await["type"], "connection-established");

    send_json(
        &mut ws,
        serde_json::json!({ "type": "terminal-resize", "cols": 100, "rows": 30 }),
    )
    .await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "terminal-input", "input": "echo from-input\n" }),
    )
    .await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "terminal-input", "processId": info.process_id, "input": "exit\n" }),
    )
    .await;

    let events = until_completed(&mut ws, &info.process_id).await;
    let stdout: String = events
        .iter()
        .filter(|e| e["type"] == "process-output")
        .filter_map(|e| e["output"].as_str())
        .collect();
    assert!(stdout.contains("from-input"));
    assert_eq!(events.last().unwrap()["stdout"], "");
}

#[tokio::test]
async fn test_disconnect_detaches() {
    let server = start_server().await;
    let mut ws = connect(&server, "/api/previews/demo/ws").await;
    next_json(&mut ws).await;
    assert_eq!(server.state.registry.stats().await.connections, 1);

    ws.close(None).await.unwrap();
    drop(ws);

    let mut connections = 1;
    for _ in 0..100 {
        connections = server.state.registry.stats().await.connections;
        if connections == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connections, 0);
    // still registered until the idle grace period passes
    assert_eq!(server.state.registry.stats().await.sessions, 1);
}

#[tokio::test]
async fn test_invalid_workspace_id_rejected_before_upgrade() {
    let server = start_server().await;
    let url = format!("ws://{}/api/previews/bad$id/ws", server.addr);
    assert!(connect_async(url).await.is_err());
}
