//! Change collection
//!
//! Buffers file-change notifications keyed by path until the debounce timer
//! flushes them as one batch.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// A buffered change to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub file_path: String,
    pub is_stylesheet: bool,
    pub module_ids: BTreeSet<String>,
}

/// Check whether a path names a stylesheet
pub fn is_stylesheet(path: &str, extensions: &[String]) -> bool {
    let lower = path.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// What happened when a change was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The pending set was empty; this change starts a new batch
    Opened,
    /// The change joined a batch already in progress
    Merged,
}

/// Accumulates changes between flushes
#[derive(Debug)]
pub struct ChangeCollector {
    extensions: Vec<String>,
    pending: BTreeMap<String, PendingChange>,
    opened_at: Option<Instant>,
}

impl ChangeCollector {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            pending: BTreeMap::new(),
            opened_at: None,
        }
    }

    /// Record a change; a later change to the same path replaces the earlier one
    pub fn record<I>(&mut self, file_path: &str, module_ids: I, now: Instant) -> RecordOutcome
    where
        I: IntoIterator<Item = String>,
    {
        let outcome = if self.pending.is_empty() {
            self.opened_at = Some(now);
            RecordOutcome::Opened
        } else {
            RecordOutcome::Merged
        };

        self.pending.insert(
            file_path.to_string(),
            PendingChange {
                file_path: file_path.to_string(),
                is_stylesheet: is_stylesheet(file_path, &self.extensions),
                module_ids: module_ids.into_iter().collect(),
            },
        );

        outcome
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain the pending set; `None` if nothing changed
    pub fn take_batch(&mut self, now: Instant) -> Option<ChangeBatch> {
        if self.pending.is_empty() {
            return None;
        }

        let changes: Vec<PendingChange> = std::mem::take(&mut self.pending).into_values().collect();
        let opened_at = self.opened_at.take().unwrap_or(now);

        Some(ChangeBatch {
            changes,
            opened_at,
        })
    }
}

/// The changes flushed together as one build
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub changes: Vec<PendingChange>,
    pub opened_at: Instant,
}

impl ChangeBatch {
    /// True iff every change in the batch is a stylesheet
    pub fn css_only(&self) -> bool {
        self.changes.iter().all(|c| c.is_stylesheet)
    }

    pub fn stylesheet_files(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.is_stylesheet)
            .map(|c| c.file_path.clone())
            .collect()
    }

    pub fn other_files(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| !c.is_stylesheet)
            .map(|c| c.file_path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extensions() -> Vec<String> {
        vec![".css".to_string(), ".scss".to_string()]
    }

    #[test]
    fn test_stylesheet_detection() {
        assert!(is_stylesheet("src/app.css", &extensions()));
        assert!(is_stylesheet("src/APP.SCSS", &extensions()));
        assert!(!is_stylesheet("src/app.ts", &extensions()));
        assert!(!is_stylesheet("src/css", &extensions()));
    }

    #[test]
    fn test_merges_by_path() {
        let mut collector = ChangeCollector::new(extensions());
        let now = Instant::now();

        assert_eq!(
            collector.record("a.css", vec!["/a.css".to_string()], now),
            RecordOutcome::Opened
        );
        assert_eq!(
            collector.record("b.ts", Vec::new(), now),
            RecordOutcome::Merged
        );
        collector.record("a.css", vec!["/a.css?v2".to_string()], now);

        assert_eq!(collector.len(), 2);
        let batch = collector.take_batch(now).unwrap();
        let a = batch.changes.iter().find(|c| c.file_path == "a.css").unwrap();
        assert_eq!(a.module_ids.iter().collect::<Vec<_>>(), vec!["/a.css?v2"]);
    }

    #[test]
    fn test_empty_collector_yields_no_batch() {
        let mut collector = ChangeCollector::new(extensions());
        assert!(collector.take_batch(Instant::now()).is_none());
    }

    #[test]
    fn test_take_batch_clears_and_reopens() {
        let mut collector = ChangeCollector::new(extensions());
        let now = Instant::now();
        collector.record("a.css", Vec::new(), now);
        assert!(collector.take_batch(now).is_some());
        assert!(collector.is_empty());
        assert_eq!(
            collector.record("a.css", Vec::new(), now),
            RecordOutcome::Opened
        );
    }

    #[test]
    fn test_css_only() {
        let mut collector = ChangeCollector::new(extensions());
        let now = Instant::now();
        collector.record("a.css", Vec::new(), now);
        collector.record("b.scss", Vec::new(), now);
        let batch = collector.take_batch(now).unwrap();
        assert!(batch.css_only());
        assert_eq!(batch.stylesheet_files(), vec!["a.css", "b.scss"]);
        assert!(batch.other_files().is_empty());

        collector.record("a.css", Vec::new(), now);
        collector.record("main.ts", Vec::new(), now);
        let batch = collector.take_batch(now).unwrap();
        assert!(!batch.css_only());
        assert_eq!(batch.other_files(), vec!["main.ts"]);
    }
}
