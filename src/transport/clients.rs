//! Active connection registry
//!
//! Each open stream or socket owns an unbounded channel; the connection task
//! forwards frames from it to the wire. A closed connection drops its
//! receiver, so the next send to it fails and the client is pruned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: DashMap<u64, mpsc::UnboundedSender<String>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client; it stays registered until the guard drops or a send fails
    pub fn register(self: &Arc<Self>) -> (ClientGuard, mpsc::UnboundedReceiver<String>) {
        self.register_with(None)
    }

    /// Add a client whose first frame is `greeting`, ahead of any broadcast
    pub fn register_with(
        self: &Arc<Self>,
        greeting: Option<String>,
    ) -> (ClientGuard, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(greeting) = greeting {
            // The receiver is still in hand, so this cannot fail
            let _ = tx.send(greeting);
        }
        self.clients.insert(id, tx);
        debug!(client = id, total = self.clients.len(), "Client connected");

        let guard = ClientGuard {
            id,
            registry: Arc::clone(self),
        };
        (guard, rx)
    }

    /// Send to one client, pruning it on failure
    pub fn send_to(&self, id: u64, frame: &str) -> bool {
        let sent = self
            .clients
            .get(&id)
            .map(|tx| tx.send(frame.to_string()).is_ok());

        match sent {
            Some(true) => true,
            Some(false) => {
                self.remove(id);
                false
            }
            None => false,
        }
    }

    /// Send a frame to every client; returns how many received it
    pub fn broadcast(&self, frame: &str) -> usize {
        // Snapshot the ids so removal during the loop cannot disturb iteration
        let ids: Vec<u64> = self.clients.iter().map(|entry| *entry.key()).collect();

        ids.into_iter()
            .filter(|id| self.send_to(*id, frame))
            .count()
    }

    pub fn remove(&self, id: u64) {
        if self.clients.remove(&id).is_some() {
            debug!(client = id, remaining = self.clients.len(), "Client disconnected");
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every client; their streams end once drained
    pub fn clear(&self) {
        self.clients.clear();
    }
}

/// Deregisters its client when dropped
#[derive(Debug)]
pub struct ClientGuard {
    id: u64,
    registry: Arc<ClientRegistry>,
}

impl ClientGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(&self, frame: &str) -> bool {
        self.registry.send_to(self.id, frame)
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
