//! Reload events
//!
//! The core hands [`ReloadEvent`]s to the active transport. Their serde form
//! is the event-stream wire format; the other transports map them onto their
//! own messages.

use serde::{Deserialize, Serialize};

use super::error::NormalizedError;
use super::status::BuildStatus;

/// Kind of a single module update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    CssUpdate,
    JsUpdate,
}

/// One module the host hot-updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_path: Option<String>,

    pub timestamp: u64,
}

/// Failure inside the mirror itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorFailure {
    pub message: String,
}

/// Events published to browser clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ReloadEvent {
    /// Greeting sent to a freshly opened stream
    Connected {
        time: u64,
        version: u64,
        #[serde(rename = "heartbeatMs")]
        heartbeat_ms: u64,
        hmr: bool,
    },

    /// Keeps idle connections open through intermediaries
    Heartbeat { time: u64 },

    /// First change of a new batch arrived
    BuildStart { time: u64, version: u64 },

    /// A batch was flushed
    BuildEnd(BuildStatus),

    /// Process-level failure
    BuildError { error: NormalizedError },

    /// Host hot-updated modules
    HmrUpdate { time: u64, updates: Vec<ModuleUpdate> },

    /// Host asked its clients to reload
    HmrFullReload {
        time: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },

    /// Host reported a build error
    HmrError { time: u64, error: NormalizedError },

    /// Any other host frame, by type name
    HmrMessage { time: u64, message: String },

    /// Full host frame with every string redacted
    HmrRaw {
        time: u64,
        payload: serde_json::Value,
    },

    /// The mirror failed to process a host frame
    #[serde(rename = "ws-error")]
    MirrorFailure { time: u64, error: MirrorFailure },
}

impl ReloadEvent {
    /// Wire name, as found in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            ReloadEvent::Connected { .. } => "connected",
            ReloadEvent::Heartbeat { .. } => "heartbeat",
            ReloadEvent::BuildStart { .. } => "build-start",
            ReloadEvent::BuildEnd(_) => "build-end",
            ReloadEvent::BuildError { .. } => "build-error",
            ReloadEvent::HmrUpdate { .. } => "hmr-update",
            ReloadEvent::HmrFullReload { .. } => "hmr-full-reload",
            ReloadEvent::HmrError { .. } => "hmr-error",
            ReloadEvent::HmrMessage { .. } => "hmr-message",
            ReloadEvent::HmrRaw { .. } => "hmr-raw",
            ReloadEvent::MirrorFailure { .. } => "ws-error",
        }
    }

    /// The error carried by this event, if any
    pub fn error(&self) -> Option<&NormalizedError> {
        match self {
            ReloadEvent::BuildError { error } | ReloadEvent::HmrError { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_match_kind() {
        let events = vec![
            ReloadEvent::Connected {
                time: 1,
                version: 1,
                heartbeat_ms: 30_000,
                hmr: true,
            },
            ReloadEvent::Heartbeat { time: 1 },
            ReloadEvent::BuildStart { time: 1, version: 1 },
            ReloadEvent::BuildEnd(BuildStatus::initial(1)),
            ReloadEvent::HmrFullReload { time: 1, path: None },
            ReloadEvent::HmrMessage {
                time: 1,
                message: "custom".to_string(),
            },
            ReloadEvent::MirrorFailure {
                time: 1,
                error: MirrorFailure {
                    message: "x".to_string(),
                },
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }

    #[test]
    fn test_build_end_flattens_status() {
        let json = serde_json::to_value(ReloadEvent::BuildEnd(BuildStatus::initial(7))).unwrap();
        assert_eq!(json["type"], "build-end");
        assert_eq!(json["version"], 1);
        assert_eq!(json["cssOnly"], false);
        assert_eq!(json["lastBuildTime"], 7);
    }

    #[test]
    fn test_connected_uses_camel_case_interval() {
        let json = serde_json::to_value(ReloadEvent::Connected {
            time: 1,
            version: 3,
            heartbeat_ms: 500,
            hmr: true,
        })
        .unwrap();
        assert_eq!(json["heartbeatMs"], 500);
    }

    #[test]
    fn test_module_update_wire_form() {
        let update = ModuleUpdate {
            kind: UpdateKind::CssUpdate,
            path: "/app.css".to_string(),
            accepted_path: Some("/app.css".to_string()),
            timestamp: 9,
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "css-update");
        assert_eq!(json["acceptedPath"], "/app.css");
    }
}
