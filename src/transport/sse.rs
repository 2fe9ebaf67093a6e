//! Server-sent event transport
//!
//! Every open stream is a registered client. New streams are greeted with a
//! `connected` event; a shared heartbeat keeps idle streams alive through
//! proxies that close quiet connections.

use std::convert::Infallible;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures_util::stream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clients::ClientRegistry;
use super::live::LiveStatus;
use crate::reload::{BuildStatus, ReloadEvent};
use crate::utils::now_millis;

/// Event stream path
pub const SSE_PATH: &str = "/__dev/reload";

pub struct SseTransport {
    clients: Arc<ClientRegistry>,
    latest: LiveStatus,
    heartbeat: Duration,
}

impl SseTransport {
    pub fn new(initial: BuildStatus, heartbeat: Duration) -> Self {
        Self {
            clients: Arc::new(ClientRegistry::new()),
            latest: LiveStatus::new(initial),
            heartbeat,
        }
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn current_status(&self) -> BuildStatus {
        self.latest.current()
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Write the event as a `data:` frame to every open stream
    pub fn publish(&self, event: &ReloadEvent) -> usize {
        self.latest.apply(event);

        match serde_json::to_string(event) {
            Ok(frame) => self.clients.broadcast(&frame),
            Err(e) => {
                warn!("Failed to encode {} event: {}", event.kind(), e);
                0
            }
        }
    }

    fn connected_event(&self) -> ReloadEvent {
        ReloadEvent::Connected {
            time: now_millis(),
            version: self.latest.version(),
            heartbeat_ms: self.heartbeat.as_millis() as u64,
            hmr: true,
        }
    }

    /// Start the shared heartbeat; it stops once the transport is dropped
    pub fn spawn_heartbeat(self: &Arc<Self>, runtime: &Handle) -> JoinHandle<()> {
        let transport: Weak<Self> = Arc::downgrade(self);
        let period = self.heartbeat;

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(transport) = transport.upgrade() else {
                    break;
                };
                let reached = transport.publish(&ReloadEvent::Heartbeat { time: now_millis() });
                debug!(clients = reached, "Heartbeat sent");
            }
        })
    }

    pub fn routes(self: &Arc<Self>) -> Router {
        Router::new()
            .route(SSE_PATH, get(stream_events))
            .with_state(Arc::clone(self))
    }
}

async fn stream_events(State(sse): State<Arc<SseTransport>>) -> Response {
    let greeting = serde_json::to_string(&sse.connected_event()).ok();
    let (guard, rx) = sse.clients.register_with(greeting);

    // The guard lives in the stream state, so closing the stream deregisters
    let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().data(frame)), (rx, guard)))
    });

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(events),
    )
        .into_response()
}
