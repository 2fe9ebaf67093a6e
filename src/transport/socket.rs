//! Raw WebSocket transport
//!
//! A plain WebSocket with no subprotocol negotiation, so it can sit next to
//! a host's own hot-update socket behind the same proxy.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::clients::ClientRegistry;
use super::live::LiveStatus;
use crate::reload::{BuildStatus, ModuleUpdate, NormalizedError, ReloadEvent, UpdateKind};
use crate::utils::now_millis;

/// Upgrade path; matched exactly
pub const SOCKET_PATH: &str = "/__dev_hmr";

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SocketMessage {
    /// Connection established
    Connected { timestamp: u64 },

    /// Keepalive; the client answers with `pong`
    Ping { timestamp: u64 },

    /// Stylesheet-only build
    Update {
        version: u64,
        #[serde(rename = "cssOnly")]
        css_only: bool,
        updates: Vec<ModuleUpdate>,
    },

    /// Build or process error
    Error { err: NormalizedError },

    /// Build that needs a page reload
    FullReload {
        version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl SocketMessage {
    /// Map a reload event onto the socket protocol; `None` if not relayed
    pub fn from_event(event: &ReloadEvent) -> Option<Self> {
        match event {
            ReloadEvent::BuildEnd(status) if status.css_only => Some(SocketMessage::Update {
                version: status.version,
                css_only: true,
                updates: module_updates(status),
            }),
            ReloadEvent::BuildEnd(status) => Some(SocketMessage::FullReload {
                version: status.version,
                path: status.changed.other.first().cloned(),
            }),
            ReloadEvent::BuildError { error } | ReloadEvent::HmrError { error, .. } => {
                Some(SocketMessage::Error { err: error.clone() })
            }
            _ => None,
        }
    }
}

fn module_updates(status: &BuildStatus) -> Vec<ModuleUpdate> {
    let css = status
        .changed
        .css
        .iter()
        .map(|path| (UpdateKind::CssUpdate, path));
    let other = status
        .changed
        .other
        .iter()
        .map(|path| (UpdateKind::JsUpdate, path));

    css.chain(other)
        .map(|(kind, path)| ModuleUpdate {
            kind,
            path: path.clone(),
            accepted_path: Some(path.clone()),
            timestamp: status.last_build_time,
        })
        .collect()
}

/// Client to server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Pong {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

pub struct SocketTransport {
    clients: Arc<ClientRegistry>,
    latest: LiveStatus,
    ping_interval: Duration,
}

impl SocketTransport {
    pub fn new(initial: BuildStatus, ping_interval: Duration) -> Self {
        Self {
            clients: Arc::new(ClientRegistry::new()),
            latest: LiveStatus::new(initial),
            ping_interval,
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn current_status(&self) -> BuildStatus {
        self.latest.current()
    }

    pub fn publish(&self, event: &ReloadEvent) -> usize {
        self.latest.apply(event);

        let Some(message) = SocketMessage::from_event(event) else {
            return 0;
        };

        match serde_json::to_string(&message) {
            Ok(json) => self.clients.broadcast(&json),
            Err(e) => {
                warn!("Failed to encode socket message: {}", e);
                0
            }
        }
    }

    pub fn routes(self: &Arc<Self>) -> Router {
        Router::new()
            .route(SOCKET_PATH, get(socket_upgrade))
            .with_state(Arc::clone(self))
    }
}

/// Handle WebSocket upgrade; no subprotocol is selected
async fn socket_upgrade(
    ws: WebSocketUpgrade,
    State(transport): State<Arc<SocketTransport>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, transport))
}

/// Serve one WebSocket connection
async fn handle_socket(socket: WebSocket, transport: Arc<SocketTransport>) {
    let (mut sender, mut receiver) = socket.split();
    let connected = SocketMessage::Connected {
        timestamp: now_millis(),
    };
    let (guard, mut rx) = transport
        .clients
        .register_with(serde_json::to_string(&connected).ok());
    let client = guard.id();

    let ping_interval = transport.ping_interval;

    // Forward published frames and pings to the client
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await;

        loop {
            let frame = tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => {
                        // Dropped from the registry, e.g. on shutdown
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let ping = SocketMessage::Ping { timestamp: now_millis() };
                    match serde_json::to_string(&ping) {
                        Ok(json) => json,
                        Err(_) => continue,
                    }
                }
            };

            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Pongs are advisory; a silent client is never disconnected for it
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Pong { .. }) => debug!(client, "Pong received"),
                    Err(_) => debug!(client, "Ignoring client message: {}", text),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever half finishes first takes the other down with it
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(guard);
    debug!(client, "Socket connection closed");
}
