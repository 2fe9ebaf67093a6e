//! Polling transport
//!
//! No connection state: the latest status is kept in one slot and served as
//! JSON. Clients poll at their own cadence and only ever see the final state.

use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::live::LiveStatus;
use crate::reload::{BuildStatus, ReloadEvent};

/// Status endpoint path
pub const STATUS_PATH: &str = "/__dev/reload/status";

pub struct PollingTransport {
    latest: LiveStatus,
}

impl PollingTransport {
    pub fn new(initial: BuildStatus) -> Self {
        Self {
            latest: LiveStatus::new(initial),
        }
    }

    /// Apply an event to the status slot
    pub fn publish(&self, event: &ReloadEvent) -> usize {
        self.latest.apply(event);
        // Nobody is reached directly; pollers pick it up later
        0
    }

    pub fn current_status(&self) -> BuildStatus {
        self.latest.current()
    }

    pub fn routes(self: &Arc<Self>) -> Router {
        Router::new()
            .route(STATUS_PATH, get(serve_status))
            .with_state(Arc::clone(self))
    }
}

async fn serve_status(State(polling): State<Arc<PollingTransport>>) -> Response {
    (
        [(header::CACHE_CONTROL, "no-cache")],
        Json(polling.current_status()),
    )
        .into_response()
}
