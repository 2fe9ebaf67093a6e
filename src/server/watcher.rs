//! File watcher host adapter
//!
//! Plays the part of the host bundler: turns file-system events into the
//! frames a host would send its own hot-update clients, lets the mirror tap
//! them, and feeds each changed path into the reload core.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::reload::{
    is_stylesheet, HostObserver, HostPayload, ModuleUpdate, RawError, ReloadContext, UpdateKind,
};
use crate::utils::{now_millis, path_to_module_id, relative_path};

/// Keeps the watcher and its event loop alive
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    task: AbortHandle,
}

impl FileWatcher {
    /// Watch `root` recursively and report changes to `context`
    pub fn start(root: PathBuf, context: Arc<ReloadContext>) -> Result<Self> {
        let ignore = build_ignore_set(&context.config().watch.ignore)?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;

        let monitor_context = context.clone();
        let event_loop = tokio::spawn(async move {
            let observer = context.observer();
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) if is_change(&event.kind) => {
                        for path in &event.paths {
                            if ignore.is_match(path) {
                                continue;
                            }
                            handle_file_change(&root, path, &context);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Watch error: {:?}", e);
                        observer.on_error(RawError::from_error(&e).with_plugin("watcher"));
                    }
                }
            }
        });

        let task = event_loop.abort_handle();
        // Cancellation is how the watcher stops, so only panics are reported
        tokio::spawn(async move {
            if let Err(e) = event_loop.await {
                if e.is_panic() {
                    monitor_context.report_task_failure("file watcher", e);
                }
            }
        });

        debug!("Watching for changes");

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore pattern: {}", pattern))?);
    }
    Ok(builder.build()?)
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// The frame a host would send its own clients for this change
pub fn host_payload_for(root: &Path, path: &Path, extensions: &[String]) -> HostPayload {
    let module_id = path_to_module_id(root, path);
    let is_html = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        .unwrap_or(false);

    if is_html {
        return HostPayload::FullReload {
            path: Some(module_id),
        };
    }

    let kind = if is_stylesheet(&path.display().to_string(), extensions) {
        UpdateKind::CssUpdate
    } else {
        UpdateKind::JsUpdate
    };

    HostPayload::Update {
        updates: vec![ModuleUpdate {
            kind,
            path: module_id.clone(),
            accepted_path: Some(module_id),
            timestamp: now_millis(),
        }],
    }
}

/// Handle a file change event
fn handle_file_change(root: &Path, path: &Path, context: &ReloadContext) {
    let display = relative_path(root, path).unwrap_or_else(|| path.display().to_string());
    eprintln!("  {} File changed: {}", "↻".yellow(), display.dimmed());

    let payload = host_payload_for(root, path, &context.config().reload.stylesheet_extensions);
    context.mirror().tap(&payload);

    let module_id = path_to_module_id(root, path);
    context.on_file_changed(&path.display().to_string(), vec![module_id]);
}
