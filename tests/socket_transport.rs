//! End-to-end tests for the raw WebSocket transport over a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dev_reload::config::{Config, TransportKind};
use dev_reload::reload::{RawError, Redactor};
use dev_reload::server::build_router;
use dev_reload::ReloadContext;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_server(config: Config) -> (SocketAddr, Arc<ReloadContext>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let context =
        ReloadContext::with_redactor(Arc::new(config), Redactor::new("/work/site", "<cwd>"))
            .unwrap();
    let app = build_router(dir.path().to_path_buf(), context.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, context, dir)
}

fn socket_config() -> Config {
    let mut config = Config::default();
    config.reload.transport = TransportKind::Websocket;
    config
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/__dev_hmr", addr))
        .await
        .unwrap();
    socket
}

/// Next JSON text frame, skipping anything else
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_socket_greets_and_sends_css_update() {
    let (addr, context, _dir) = start_server(socket_config()).await;
    let mut socket = connect(addr).await;

    let connected = next_json(&mut socket).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(context.transport().client_count(), 1);

    context.on_file_changed("/work/site/style.css", vec!["/style.css".to_string()]);

    // build-start is not relayed, so the next frame is the build itself
    let update = next_json(&mut socket).await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["version"], 2);
    assert_eq!(update["cssOnly"], true);
    assert_eq!(update["updates"][0]["type"], "css-update");
    assert_eq!(update["updates"][0]["path"], "<cwd>/style.css");
}

#[tokio::test]
async fn test_socket_full_reload_for_mixed_build() {
    let (addr, context, _dir) = start_server(socket_config()).await;
    let mut socket = connect(addr).await;
    next_json(&mut socket).await;

    context.on_file_changed("/work/site/style.css", vec![]);
    context.on_file_changed("/work/site/main.js", vec![]);
    context.flush().unwrap();

    let reload = next_json(&mut socket).await;
    assert_eq!(reload["type"], "full-reload");
    assert_eq!(reload["version"], 2);
    assert_eq!(reload["path"], "<cwd>/main.js");
}

#[tokio::test]
async fn test_socket_mirrors_errors_once_per_window() {
    let (addr, context, _dir) = start_server(socket_config()).await;
    let mut socket = connect(addr).await;
    next_json(&mut socket).await;

    let observer = context.observer();
    observer.on_error(RawError::new("Cannot find /work/site/lib.js").with_plugin("resolve"));
    observer.on_error(RawError::new("Cannot find /work/site/lib.js").with_plugin("resolve"));
    observer.on_error(RawError::new("Something else"));

    let first = next_json(&mut socket).await;
    assert_eq!(first["type"], "error");
    assert_eq!(first["err"]["message"], "Cannot find <cwd>/lib.js");
    assert_eq!(first["err"]["plugin"], "resolve");

    // The duplicate was swallowed
    let second = next_json(&mut socket).await;
    assert_eq!(second["err"]["message"], "Something else");
}

#[tokio::test]
async fn test_socket_pings_and_accepts_pongs() {
    let mut config = socket_config();
    config.reload.ping_interval_ms = 50;
    let (addr, context, _dir) = start_server(config).await;
    let mut socket = connect(addr).await;
    next_json(&mut socket).await;

    let ping = next_json(&mut socket).await;
    assert_eq!(ping["type"], "ping");

    socket
        .send(Message::Text(r#"{"type":"pong","timestamp":1}"#.to_string()))
        .await
        .unwrap();
    socket
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();

    // Still connected after both
    let ping = next_json(&mut socket).await;
    assert_eq!(ping["type"], "ping");
    assert_eq!(context.transport().client_count(), 1);
}

#[tokio::test]
async fn test_closed_socket_is_deregistered() {
    let (addr, context, _dir) = start_server(socket_config()).await;
    let mut socket = connect(addr).await;
    next_json(&mut socket).await;
    assert_eq!(context.transport().client_count(), 1);

    socket.close(None).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while context.transport().client_count() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "client never removed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Publishing to nobody is fine
    context.on_file_changed("/work/site/style.css", vec![]);
    assert!(context.flush().is_some());
}

#[tokio::test]
async fn test_shutdown_closes_open_sockets() {
    let (addr, context, _dir) = start_server(socket_config()).await;
    let mut socket = connect(addr).await;
    next_json(&mut socket).await;

    context.shutdown();

    let next = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("socket left half-open");
    assert!(
        !matches!(next, Some(Ok(Message::Text(_)))),
        "unexpected frame after shutdown: {:?}",
        next
    );
}
