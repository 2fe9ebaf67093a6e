//! Error mirror
//!
//! Taps copies of what the host sends to its own hot-update clients and of
//! process-level failures, and republishes them over the active transport.
//! The host's delivery path is never touched: every entry point returns `()`
//! and swallows its own failures.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::error::{normalize_build_error, ErrorDeduper, NormalizedError, RawError, Redactor};
use super::event::{MirrorFailure, ModuleUpdate, ReloadEvent};
use crate::transport::Transport;
use crate::utils::now_millis;

/// Build-lifecycle notifications a host adapter delivers to the core
pub trait HostObserver: Send + Sync {
    /// Modules were hot-updated
    fn on_update(&self, updates: Vec<ModuleUpdate>);

    /// The host asked its clients to reload the page
    fn on_full_reload(&self, path: Option<String>);

    /// The host reported a build error
    fn on_error(&self, error: RawError);

    /// Any other frame, by type name
    fn on_message(&self, _kind: &str) {}
}

/// A frame the host sends to its own hot-update clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostPayload {
    Connected,
    Update {
        updates: Vec<ModuleUpdate>,
    },
    FullReload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Prune {
        paths: Vec<String>,
    },
    Error {
        err: RawError,
    },
    Custom {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl HostPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            HostPayload::Connected => "connected",
            HostPayload::Update { .. } => "update",
            HostPayload::FullReload { .. } => "full-reload",
            HostPayload::Prune { .. } => "prune",
            HostPayload::Error { .. } => "error",
            HostPayload::Custom { .. } => "custom",
        }
    }
}

/// Sender half of the process-failure channel of the active mirror
static PROCESS_ERRORS: Lazy<RwLock<Option<mpsc::UnboundedSender<RawError>>>> =
    Lazy::new(|| RwLock::new(None));

static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Route panics to the active mirror; installed once per process
pub fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = panic_message(info.payload());
            let location = info.location().map(|l| l.to_string());

            report_panic(message, location);
            previous(info);
        }));
        debug!("Panic hook installed");
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

fn report_panic(message: String, location: Option<String>) {
    // A panic while the slot is being swapped is dropped rather than deadlocking
    let Some(slot) = PROCESS_ERRORS.try_read() else {
        return;
    };
    let Some(sender) = slot.as_ref() else {
        return;
    };

    let backtrace = std::backtrace::Backtrace::capture().to_string();
    let mut stack = Vec::new();
    if let Some(location) = location {
        stack.push(format!("    at {}", location));
    }
    if !backtrace.is_empty() && !backtrace.starts_with("disabled") {
        stack.push(backtrace);
    }

    let raw = RawError::new(message)
        .with_plugin("panic")
        .with_stack(stack.join("\n"));
    let _ = sender.send(raw);
}

/// Republishes host frames and process failures as reload events
pub struct ErrorMirror {
    transport: Arc<Transport>,
    redactor: Redactor,
    deduper: Mutex<ErrorDeduper>,
    process_errors: mpsc::UnboundedSender<RawError>,
}

impl ErrorMirror {
    /// Create a mirror; the receiver carries process-level failures and must
    /// be drained with [`ErrorMirror::drain_process_errors`]
    pub fn new(
        transport: Arc<Transport>,
        redactor: Redactor,
        deduper: ErrorDeduper,
    ) -> (Self, mpsc::UnboundedReceiver<RawError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mirror = Self {
            transport,
            redactor,
            deduper: Mutex::new(deduper),
            process_errors: tx,
        };
        (mirror, rx)
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Make this mirror the target of panic reports
    pub fn activate(&self) {
        *PROCESS_ERRORS.write() = Some(self.process_errors.clone());
    }

    /// Stop receiving panic reports, unless another mirror took over
    pub fn deactivate(&self) {
        let mut slot = PROCESS_ERRORS.write();
        if slot
            .as_ref()
            .map(|sender| sender.same_channel(&self.process_errors))
            .unwrap_or(false)
        {
            *slot = None;
        }
    }

    /// Publish process failures as they arrive
    pub async fn drain_process_errors(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<RawError>,
    ) {
        while let Some(raw) = rx.recv().await {
            self.report_process_error(raw);
        }
    }

    /// Queue a failure from outside the host's build pipeline
    pub fn submit_process_error(&self, raw: RawError) {
        let _ = self.process_errors.send(raw);
    }

    /// Report a failure from outside the host's build pipeline
    pub fn report_process_error(&self, raw: RawError) {
        if let Some(error) = self.admit(&raw) {
            warn!(message = %error.message, "Process error mirrored to clients");
            self.transport.publish(&ReloadEvent::BuildError { error });
        }
    }

    /// Report a spawned task that panicked or was cancelled
    pub fn report_task_failure(&self, task: &str, error: JoinError) {
        let message = if error.is_panic() {
            format!("task `{}` panicked: {}", task, panic_message(&*error.into_panic()))
        } else {
            format!("task `{}` was cancelled", task)
        };
        self.report_process_error(RawError::new(message).with_plugin("task"));
    }

    /// Observe a copy of a host frame
    pub fn tap(&self, payload: &HostPayload) {
        match payload {
            HostPayload::Update { updates } => self.on_update(updates.clone()),
            HostPayload::FullReload { path } => self.on_full_reload(path.clone()),
            HostPayload::Error { err } => {
                // A suppressed error is not repeated through the raw copy either
                if !self.publish_host_error(err) {
                    return;
                }
            }
            other => self.on_message(other.kind()),
        }

        match serde_json::to_value(payload) {
            Ok(value) => {
                self.transport.publish(&ReloadEvent::HmrRaw {
                    time: now_millis(),
                    payload: redact_value(value, &self.redactor),
                });
            }
            Err(e) => {
                self.transport.publish(&ReloadEvent::MirrorFailure {
                    time: now_millis(),
                    error: MirrorFailure {
                        message: e.to_string(),
                    },
                });
            }
        }
    }

    fn publish_host_error(&self, raw: &RawError) -> bool {
        match self.admit(raw) {
            Some(error) => {
                self.transport.publish(&ReloadEvent::HmrError {
                    time: now_millis(),
                    error,
                });
                true
            }
            None => false,
        }
    }

    fn admit(&self, raw: &RawError) -> Option<NormalizedError> {
        let error = normalize_build_error(raw, &self.redactor);
        if self.deduper.lock().admit(&error, Instant::now()) {
            Some(error)
        } else {
            debug!(message = %error.message, "Suppressed repeated error");
            None
        }
    }
}

impl HostObserver for ErrorMirror {
    fn on_update(&self, updates: Vec<ModuleUpdate>) {
        let updates = updates
            .into_iter()
            .map(|update| ModuleUpdate {
                path: self.redactor.redact(&update.path),
                accepted_path: update.accepted_path.map(|p| self.redactor.redact(&p)),
                ..update
            })
            .collect();

        self.transport.publish(&ReloadEvent::HmrUpdate {
            time: now_millis(),
            updates,
        });
    }

    fn on_full_reload(&self, path: Option<String>) {
        self.transport.publish(&ReloadEvent::HmrFullReload {
            time: now_millis(),
            path: path.map(|p| self.redactor.redact(&p)),
        });
    }

    fn on_error(&self, error: RawError) {
        self.publish_host_error(&error);
    }

    fn on_message(&self, kind: &str) {
        self.transport.publish(&ReloadEvent::HmrMessage {
            time: now_millis(),
            message: kind.to_string(),
        });
    }
}

/// Redact every string in a JSON document
fn redact_value(value: serde_json::Value, redactor: &Redactor) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) => Value::String(redactor.redact_lines(&s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| redact_value(item, redactor))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, redact_value(item, redactor)))
                .collect(),
        ),
        other => other,
    }
}
