//! Live reload core
//!
//! File changes flow through the collector and the debounce timer into the
//! status board, which publishes one versioned build per burst over the
//! active transport. Mirrored host errors and process failures take a side
//! path straight to the transport.

mod change;
mod debounce;
mod error;
mod event;
mod mirror;
mod status;

use std::sync::{Arc, Weak};
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::transport::Transport;
use crate::utils::{format_duration, now_millis};

pub use change::{is_stylesheet, ChangeBatch, ChangeCollector, PendingChange, RecordOutcome};
pub use debounce::Debouncer;
pub use error::{normalize_build_error, ErrorDeduper, NormalizedError, RawError, Redactor};
pub use event::{MirrorFailure, ModuleUpdate, ReloadEvent, UpdateKind};
pub use mirror::{install_panic_hook, ErrorMirror, HostObserver, HostPayload};
pub use status::{BuildStatus, ChangedFiles, StatusBoard};

struct CoreState {
    collector: ChangeCollector,
    board: StatusBoard,
}

/// Everything the reloader owns for the lifetime of one dev server
pub struct ReloadContext {
    config: Arc<Config>,
    transport: Arc<Transport>,
    mirror: Arc<ErrorMirror>,
    redactor: Redactor,
    state: Mutex<CoreState>,
    debouncer: Debouncer,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    this: Weak<ReloadContext>,
}

impl ReloadContext {
    /// Create a context redacting the process working directory
    pub fn new(config: Arc<Config>) -> Result<Arc<Self>> {
        let redactor = Redactor::from_current_dir(config.reload.placeholder.clone());
        Self::with_redactor(config, redactor)
    }

    /// Create a context; must be called from within a Tokio runtime
    pub fn with_redactor(config: Arc<Config>, redactor: Redactor) -> Result<Arc<Self>> {
        let runtime =
            Handle::try_current().context("The reload context needs a running Tokio runtime")?;

        let initial = BuildStatus::initial(now_millis());
        let transport = Arc::new(Transport::new(
            config.reload.transport,
            &config,
            initial.clone(),
        ));

        let (mirror, process_errors) = ErrorMirror::new(
            transport.clone(),
            redactor.clone(),
            ErrorDeduper::new(config.error_dedupe_window()),
        );
        let mirror = Arc::new(mirror);
        install_panic_hook();
        mirror.activate();

        let mut tasks = vec![runtime.spawn(mirror.clone().drain_process_errors(process_errors))];
        tasks.extend(transport.start(&runtime));

        let collector = ChangeCollector::new(config.reload.stylesheet_extensions.clone());
        let debouncer = Debouncer::new(config.debounce(), runtime);

        info!(
            transport = %transport.kind(),
            endpoint = transport.endpoint(),
            "Live reload ready"
        );

        Ok(Arc::new_cyclic(|this| Self {
            config,
            transport,
            mirror,
            redactor,
            state: Mutex::new(CoreState {
                collector,
                board: StatusBoard::new(initial.last_build_time),
            }),
            debouncer,
            tasks: Mutex::new(tasks),
            this: this.clone(),
        }))
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn mirror(&self) -> &Arc<ErrorMirror> {
        &self.mirror
    }

    /// Handle for a host adapter to report build-lifecycle events
    pub fn observer(&self) -> Arc<dyn HostObserver> {
        self.mirror.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().board.version()
    }

    pub fn status(&self) -> BuildStatus {
        self.state.lock().board.current().clone()
    }

    /// Changes waiting for the next flush
    pub fn pending(&self) -> usize {
        self.state.lock().collector.len()
    }

    /// Browser runtime for the active transport, at the current version
    pub fn client_script(&self) -> String {
        self.transport.client_script(self.version(), &self.config)
    }

    /// Record a changed file and (re)arm the debounce timer
    ///
    /// Returns `modules` untouched so the host's own update handling can go
    /// on with them.
    pub fn on_file_changed(&self, file_path: &str, modules: Vec<String>) -> Vec<String> {
        {
            let mut state = self.state.lock();
            let outcome = state
                .collector
                .record(file_path, modules.iter().cloned(), Instant::now());

            if outcome == RecordOutcome::Opened {
                let version = state.board.version();
                self.transport.publish(&ReloadEvent::BuildStart {
                    time: now_millis(),
                    version,
                });
            }
        }

        debug!(file = %self.redactor.redact(file_path), "Change recorded");

        let this = self.this.clone();
        self.debouncer.schedule(move || {
            if let Some(context) = this.upgrade() {
                context.flush();
            }
        });

        modules
    }

    /// Publish pending changes as the next build; no-op when nothing changed
    pub fn flush(&self) -> Option<BuildStatus> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let batch = state.collector.take_batch(now)?;
        let status = state
            .board
            .flush(&batch, now_millis(), now, &self.redactor);

        // Published under the lock so versions reach clients in order
        let reached = self.transport.publish(&ReloadEvent::BuildEnd(status.clone()));
        drop(state);

        info!(
            version = status.version,
            css_only = status.css_only,
            files = batch.changes.len(),
            clients = reached,
            "Build published in {}",
            format_duration(now.saturating_duration_since(batch.opened_at))
        );

        Some(status)
    }

    /// Report a failure that happened outside the host's build pipeline
    pub fn report_error(&self, error: &anyhow::Error) {
        let source: &(dyn std::error::Error + 'static) = error.as_ref();
        self.mirror.report_process_error(RawError::from_error(source));
    }

    /// Report a spawned task that panicked or was cancelled
    pub fn report_task_failure(&self, task: &str, error: tokio::task::JoinError) {
        self.mirror.report_task_failure(task, error);
    }

    /// Cancel timers, stop background tasks and drop every client
    pub fn shutdown(&self) {
        self.debouncer.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.transport.close();
        self.mirror.deactivate();
    }
}

impl Drop for ReloadContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
