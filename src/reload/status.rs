//! Build status publisher
//!
//! Holds the one live [`BuildStatus`] and turns flushed batches into new
//! versions. The status is replaced wholesale on every flush; there is no
//! history, so a slow poller only ever sees the latest build.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::change::ChangeBatch;
use super::error::{NormalizedError, Redactor};

/// Files touched by a build, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFiles {
    pub css: Vec<String>,
    pub other: Vec<String>,
}

/// Result of the most recent flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    /// Sole ordering key for clients; starts at 1 and grows by one per flush
    pub version: u64,

    /// Milliseconds since the Unix epoch
    pub last_build_time: u64,

    pub css_only: bool,

    #[serde(default)]
    pub changed: ChangedFiles,

    #[serde(default)]
    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NormalizedError>,
}

impl BuildStatus {
    /// Status before any flush
    pub fn initial(time: u64) -> Self {
        Self {
            version: 1,
            last_build_time: time,
            css_only: false,
            changed: ChangedFiles::default(),
            duration_ms: 0,
            error: None,
        }
    }

    /// All changed files, stylesheets first
    pub fn files(&self) -> Vec<String> {
        self.changed
            .css
            .iter()
            .chain(self.changed.other.iter())
            .cloned()
            .collect()
    }
}

/// Owner of the live build status
#[derive(Debug)]
pub struct StatusBoard {
    current: BuildStatus,
}

impl StatusBoard {
    pub fn new(time: u64) -> Self {
        Self {
            current: BuildStatus::initial(time),
        }
    }

    pub fn current(&self) -> &BuildStatus {
        &self.current
    }

    pub fn version(&self) -> u64 {
        self.current.version
    }

    /// Publish a batch as the next version
    pub fn flush(
        &mut self,
        batch: &ChangeBatch,
        time: u64,
        now: Instant,
        redactor: &Redactor,
    ) -> BuildStatus {
        let redact_all = |files: Vec<String>| -> Vec<String> {
            files.iter().map(|f| redactor.redact(f)).collect()
        };

        self.current = BuildStatus {
            version: self.current.version + 1,
            last_build_time: time,
            css_only: batch.css_only(),
            changed: ChangedFiles {
                css: redact_all(batch.stylesheet_files()),
                other: redact_all(batch.other_files()),
            },
            duration_ms: now.saturating_duration_since(batch.opened_at).as_millis() as u64,
            error: None,
        };

        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::change::ChangeCollector;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn redactor() -> Redactor {
        Redactor::new("/work/app", "<cwd>")
    }

    fn batch(files: &[&str]) -> ChangeBatch {
        let mut collector = ChangeCollector::new(vec![".css".to_string()]);
        let now = Instant::now();
        for file in files {
            collector.record(file, Vec::new(), now);
        }
        collector.take_batch(now).unwrap()
    }

    #[test]
    fn test_versions_increase_by_one() {
        let mut board = StatusBoard::new(0);
        assert_eq!(board.version(), 1);

        let now = Instant::now();
        let first = board.flush(&batch(&["a.css"]), 10, now, &redactor());
        let second = board.flush(&batch(&["b.ts"]), 20, now, &redactor());

        assert_eq!(first.version, 2);
        assert_eq!(second.version, 3);
        assert_eq!(board.current(), &second);
    }

    #[test]
    fn test_flush_redacts_and_splits_files() {
        let mut board = StatusBoard::new(0);
        let b = batch(&["/work/app/src/a.css", "/work/app/src/main.ts"]);
        let later = b.opened_at + Duration::from_millis(95);
        let status = board.flush(&b, 1234, later, &redactor());

        assert!(!status.css_only);
        assert_eq!(status.changed.css, vec!["<cwd>/src/a.css"]);
        assert_eq!(status.changed.other, vec!["<cwd>/src/main.ts"]);
        assert_eq!(status.duration_ms, 95);
        assert_eq!(status.last_build_time, 1234);
    }

    #[test]
    fn test_wire_format() {
        let status = BuildStatus::initial(42);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["lastBuildTime"], 42);
        assert_eq!(json["cssOnly"], false);
        assert_eq!(json["durationMs"], 0);
        assert!(json["changed"]["css"].as_array().unwrap().is_empty());
        assert!(json.get("error").is_none());
    }
}
