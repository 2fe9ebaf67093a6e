//! Transport layer
//!
//! Three interchangeable ways of carrying reload events to the browser. A
//! deployment picks exactly one; the debounce and error handling in front of
//! them are shared.

mod clients;
mod live;
mod polling;
mod socket;
mod sse;

use std::sync::Arc;

use axum::Router;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::client::scripts::{self, ScriptOptions};
use crate::config::{Config, TransportKind};
use crate::reload::{BuildStatus, ReloadEvent};

pub use clients::{ClientGuard, ClientRegistry};
pub use live::LiveStatus;
pub use polling::{PollingTransport, STATUS_PATH};
pub use socket::{ClientMessage, SocketMessage, SocketTransport, SOCKET_PATH};
pub use sse::{SseTransport, SSE_PATH};

/// The active delivery mechanism
pub enum Transport {
    Polling(Arc<PollingTransport>),
    Sse(Arc<SseTransport>),
    Socket(Arc<SocketTransport>),
}

impl Transport {
    pub fn new(kind: TransportKind, config: &Config, initial: BuildStatus) -> Self {
        match kind {
            TransportKind::Polling => Transport::Polling(Arc::new(PollingTransport::new(initial))),
            TransportKind::Sse => {
                Transport::Sse(Arc::new(SseTransport::new(initial, config.heartbeat())))
            }
            TransportKind::Websocket => {
                Transport::Socket(Arc::new(SocketTransport::new(
                    initial,
                    config.ping_interval(),
                )))
            }
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Polling(_) => TransportKind::Polling,
            Transport::Sse(_) => TransportKind::Sse,
            Transport::Socket(_) => TransportKind::Websocket,
        }
    }

    /// Path the browser runtime connects to
    pub fn endpoint(&self) -> &'static str {
        match self {
            Transport::Polling(_) => STATUS_PATH,
            Transport::Sse(_) => SSE_PATH,
            Transport::Socket(_) => SOCKET_PATH,
        }
    }

    /// Fan an event out; returns the number of clients reached directly
    pub fn publish(&self, event: &ReloadEvent) -> usize {
        match self {
            Transport::Polling(polling) => polling.publish(event),
            Transport::Sse(sse) => sse.publish(event),
            Transport::Socket(socket) => socket.publish(event),
        }
    }

    /// Latest build status, with any error reported since
    pub fn current_status(&self) -> BuildStatus {
        match self {
            Transport::Polling(polling) => polling.current_status(),
            Transport::Sse(sse) => sse.current_status(),
            Transport::Socket(socket) => socket.current_status(),
        }
    }

    /// Registry of open connections, for the connection-oriented variants
    pub fn clients(&self) -> Option<&Arc<ClientRegistry>> {
        match self {
            Transport::Polling(_) => None,
            Transport::Sse(sse) => Some(sse.clients()),
            Transport::Socket(socket) => Some(socket.clients()),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients().map(|clients| clients.len()).unwrap_or(0)
    }

    /// Start background work such as the SSE heartbeat
    pub fn start(&self, runtime: &Handle) -> Option<JoinHandle<()>> {
        match self {
            Transport::Sse(sse) => Some(sse.spawn_heartbeat(runtime)),
            _ => None,
        }
    }

    /// Drop every open connection
    pub fn close(&self) {
        if let Some(clients) = self.clients() {
            clients.clear();
        }
    }

    /// Routes for this transport's endpoint
    pub fn routes(&self) -> Router {
        match self {
            Transport::Polling(polling) => polling.routes(),
            Transport::Sse(sse) => sse.routes(),
            Transport::Socket(socket) => socket.routes(),
        }
    }

    /// Browser runtime that speaks this transport
    pub fn client_script(&self, version: u64, config: &Config) -> String {
        scripts::client_script(&ScriptOptions {
            kind: self.kind(),
            endpoint: self.endpoint(),
            version,
            poll_interval_ms: config.reload.poll_interval_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_per_kind() {
        let config = Config::default();
        let cases = [
            (TransportKind::Polling, "/__dev/reload/status"),
            (TransportKind::Sse, "/__dev/reload"),
            (TransportKind::Websocket, "/__dev_hmr"),
        ];
        for (kind, endpoint) in cases {
            let transport = Transport::new(kind, &config, BuildStatus::initial(0));
            assert_eq!(transport.kind(), kind);
            assert_eq!(transport.endpoint(), endpoint);
        }
    }

    #[test]
    fn test_every_variant_tracks_status() {
        let config = Config::default();
        for kind in [
            TransportKind::Polling,
            TransportKind::Sse,
            TransportKind::Websocket,
        ] {
            let transport = Transport::new(kind, &config, BuildStatus::initial(0));
            let mut status = BuildStatus::initial(10);
            status.version = 2;
            status.css_only = true;
            transport.publish(&ReloadEvent::BuildEnd(status.clone()));
            assert_eq!(transport.current_status(), status, "{}", kind);
        }
    }

    #[test]
    fn test_only_connections_have_clients() {
        let config = Config::default();
        let polling = Transport::new(TransportKind::Polling, &config, BuildStatus::initial(0));
        let sse = Transport::new(TransportKind::Sse, &config, BuildStatus::initial(0));
        assert!(polling.clients().is_none());
        assert_eq!(sse.client_count(), 0);
    }

    #[test]
    fn test_close_drops_clients() {
        let config = Config::default();
        let socket = Transport::new(TransportKind::Websocket, &config, BuildStatus::initial(0));
        let (_guard, _rx) = socket.clients().unwrap().register();
        assert_eq!(socket.client_count(), 1);
        socket.close();
        assert_eq!(socket.client_count(), 0);
    }
}
