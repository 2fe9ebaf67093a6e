//! Error normalization and de-duplication
//!
//! Every error that reaches a browser passes through [`Redactor`] so the
//! absolute working directory never leaves the process, and through
//! [`ErrorDeduper`] so a burst of identical frames shows up once.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An error as reported by the host, before redaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Name of the plugin or subsystem that raised it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    /// Module the error belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Build from a Rust error; the source chain becomes the stack
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(format!("    caused by: {}", cause));
            source = cause.source();
        }

        let raw = Self::new(err.to_string());
        if stack.is_empty() {
            raw
        } else {
            raw.with_stack(stack.join("\n"))
        }
    }
}

/// An error shaped for client display, with the working directory redacted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    pub stack: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Replaces every occurrence of the working directory with a placeholder
#[derive(Debug, Clone)]
pub struct Redactor {
    cwd: String,
    placeholder: String,
}

impl Redactor {
    pub fn new(cwd: impl AsRef<Path>, placeholder: impl Into<String>) -> Self {
        Self {
            cwd: cwd.as_ref().display().to_string(),
            placeholder: placeholder.into(),
        }
    }

    /// Redactor for the process working directory
    pub fn from_current_dir(placeholder: impl Into<String>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::new(cwd, placeholder)
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn redact(&self, text: &str) -> String {
        // `str::replace` with an empty pattern would interleave the placeholder
        if self.cwd.is_empty() {
            return text.to_string();
        }
        text.replace(&self.cwd, &self.placeholder)
    }

    /// Redact a multi-line stack one line at a time
    pub fn redact_lines(&self, text: &str) -> String {
        text.split('\n')
            .map(|line| self.redact(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Normalize a raw host error for delivery to clients
pub fn normalize_build_error(raw: &RawError, redactor: &Redactor) -> NormalizedError {
    NormalizedError {
        message: redactor.redact(&raw.message),
        stack: raw
            .stack
            .as_deref()
            .map(|stack| redactor.redact_lines(stack))
            .unwrap_or_default(),
        plugin: raw.plugin.clone(),
        id: raw.id.as_deref().map(|id| redactor.redact(id)),
    }
}

/// Suppresses an error identical to the previous one within a short window
#[derive(Debug)]
pub struct ErrorDeduper {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl ErrorDeduper {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Returns `true` when `error` should be delivered
    pub fn admit(&mut self, error: &NormalizedError, now: Instant) -> bool {
        let signature = signature(error);

        if let Some((last_signature, last_time)) = &self.last {
            if *last_signature == signature && now.duration_since(*last_time) <= self.window {
                return false;
            }
        }

        self.last = Some((signature, now));
        true
    }
}

/// Digest of (plugin, id, message)
fn signature(error: &NormalizedError) -> String {
    let mut hasher = Sha256::new();
    hasher.update(error.plugin.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(error.id.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(error.message.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn redactor() -> Redactor {
        Redactor::new("/home/user/project", "<cwd>")
    }

    #[test]
    fn test_redacts_message_and_every_stack_line() {
        let raw = RawError::new("Failed to parse /home/user/project/src/app.ts")
            .with_stack(
                "Error: boom\n    at parse (/home/user/project/src/app.ts:3:7)\n    at /home/user/project/node_modules/x.js:1:1",
            )
            .with_plugin("ts")
            .with_id("/home/user/project/src/app.ts");

        let norm = normalize_build_error(&raw, &redactor());

        assert_eq!(norm.message, "Failed to parse <cwd>/src/app.ts");
        assert_eq!(norm.id.as_deref(), Some("<cwd>/src/app.ts"));
        assert_eq!(norm.plugin.as_deref(), Some("ts"));
        assert_eq!(norm.stack.lines().count(), 3);
        assert!(!norm.stack.contains("/home/user/project"));
        assert!(norm.stack.lines().skip(1).all(|line| line.contains("<cwd>")));
    }

    #[test]
    fn test_redacts_repeated_occurrences() {
        let text = "/home/user/project and /home/user/project again";
        assert_eq!(redactor().redact(text), "<cwd> and <cwd> again");
    }

    #[test]
    fn test_empty_cwd_leaves_text_alone() {
        let redactor = Redactor::new("", "<cwd>");
        assert_eq!(redactor.redact("abc"), "abc");
    }

    #[test]
    fn test_missing_stack_normalizes_to_empty() {
        let norm = normalize_build_error(&RawError::new("x"), &redactor());
        assert_eq!(norm.stack, "");
        assert_eq!(norm.id, None);
    }

    #[test]
    fn test_from_error_uses_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let outer = anyhow::Error::new(inner).context("reading config");
        let source: &(dyn std::error::Error + 'static) = outer.as_ref();
        let raw = RawError::from_error(source);
        assert_eq!(raw.message, "reading config");
        assert_eq!(raw.stack.as_deref(), Some("    caused by: missing"));
    }

    #[test]
    fn test_deduper_collapses_within_window() {
        let mut deduper = ErrorDeduper::new(Duration::from_millis(400));
        let err = normalize_build_error(&RawError::new("boom").with_plugin("css"), &redactor());
        let start = Instant::now();

        assert!(deduper.admit(&err, start));
        assert!(!deduper.admit(&err, start + Duration::from_millis(100)));
        assert!(!deduper.admit(&err, start + Duration::from_millis(399)));
        assert!(deduper.admit(&err, start + Duration::from_millis(500)));
    }

    #[test]
    fn test_deduper_suppression_does_not_extend_window() {
        let mut deduper = ErrorDeduper::new(Duration::from_millis(400));
        let err = normalize_build_error(&RawError::new("boom"), &redactor());
        let start = Instant::now();

        assert!(deduper.admit(&err, start));
        assert!(!deduper.admit(&err, start + Duration::from_millis(300)));
        assert!(deduper.admit(&err, start + Duration::from_millis(450)));
    }

    #[test]
    fn test_deduper_passes_different_signatures() {
        let mut deduper = ErrorDeduper::new(Duration::from_millis(400));
        let now = Instant::now();
        let a = normalize_build_error(&RawError::new("boom").with_id("a.ts"), &redactor());
        let b = normalize_build_error(&RawError::new("boom").with_id("b.ts"), &redactor());

        assert!(deduper.admit(&a, now));
        assert!(deduper.admit(&b, now));
        assert!(deduper.admit(&a, now));
    }
}
