//! Configuration schema definitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which delivery mechanism carries build status to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Client fetches the status endpoint on an interval
    Polling,

    /// Server pushes `data:` frames over an event stream
    Sse,

    /// Plain WebSocket without subprotocol negotiation
    #[serde(alias = "ws")]
    #[value(alias = "ws")]
    Websocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Polling => "polling",
            TransportKind::Sse => "sse",
            TransportKind::Websocket => "websocket",
        };
        f.write_str(name)
    }
}

/// Development server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to run dev server on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Directory to serve and watch, relative to the config file
    #[serde(default = "default_root")]
    pub root: String,

    /// Open browser automatically
    #[serde(default)]
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            root: default_root(),
            open: false,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_root() -> String {
    ".".to_string()
}

/// Live reload behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Active transport
    #[serde(default = "default_transport")]
    pub transport: TransportKind,

    /// Quiet period after the last change before a build is published
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// SSE heartbeat interval
    #[serde(default = "default_keepalive_ms")]
    pub heartbeat_ms: u64,

    /// WebSocket ping interval
    #[serde(default = "default_keepalive_ms")]
    pub ping_interval_ms: u64,

    /// Client-side polling interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Window in which a repeated identical error is suppressed
    #[serde(default = "default_error_dedupe_ms")]
    pub error_dedupe_ms: u64,

    /// File suffixes treated as stylesheets (matched case-insensitively)
    #[serde(default = "default_stylesheet_extensions")]
    pub stylesheet_extensions: Vec<String>,

    /// Token substituted for the working directory in paths sent to clients
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            debounce_ms: default_debounce_ms(),
            heartbeat_ms: default_keepalive_ms(),
            ping_interval_ms: default_keepalive_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            error_dedupe_ms: default_error_dedupe_ms(),
            stylesheet_extensions: default_stylesheet_extensions(),
            placeholder: default_placeholder(),
        }
    }
}

fn default_transport() -> TransportKind {
    TransportKind::Sse
}

fn default_debounce_ms() -> u64 {
    80
}

fn default_keepalive_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_error_dedupe_ms() -> u64 {
    400
}

fn default_stylesheet_extensions() -> Vec<String> {
    [".css", ".scss", ".sass", ".less", ".styl", ".pcss"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_placeholder() -> String {
    "<cwd>".to_string()
}

/// File watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns excluded from change detection
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore: default_ignore(),
        }
    }
}

fn default_ignore() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
    ]
}
