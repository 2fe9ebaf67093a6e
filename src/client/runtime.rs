//! Client runtime state machine
//!
//! The injected browser scripts implement exactly this logic; it lives here
//! so the decisions and the reconnect schedule can be tested, and so the
//! scripts are generated from the same constants.

use std::time::Duration;

use crate::config::TransportKind;

/// Connection state of a browser client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; a manual refresh is needed
    GaveUp,
}

/// What the client does with an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Swap every stylesheet link for a cache-busted clone
    PatchStylesheets { version: u64 },
    /// Reload the page
    FullReload,
    /// Print the error to the console
    LogError(String),
    /// Stale or irrelevant
    Ignore,
}

/// How a client retries after losing its connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectPolicy {
    /// Growing delays up to a cap, then give up
    Exponential {
        base: Duration,
        factor: f64,
        cap: Duration,
        max_attempts: u32,
    },
    /// Retry after the same delay forever
    Fixed { delay: Duration },
    /// Nothing to reconnect; the client polls on an interval
    None,
}

impl ReconnectPolicy {
    pub fn for_transport(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Websocket => ReconnectPolicy::Exponential {
                base: Duration::from_millis(1000),
                factor: 1.5,
                cap: Duration::from_millis(30_000),
                max_attempts: 10,
            },
            TransportKind::Sse => ReconnectPolicy::Fixed {
                delay: Duration::from_millis(1000),
            },
            TransportKind::Polling => ReconnectPolicy::None,
        }
    }

    /// Delay before attempt number `attempt` (zero-based); `None` to give up
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Exponential {
                base,
                factor,
                cap,
                max_attempts,
            } => {
                if attempt >= max_attempts {
                    return None;
                }
                let millis = base.as_millis() as f64 * factor.powi(attempt as i32);
                Some(Duration::from_millis(millis as u64).min(cap))
            }
            ReconnectPolicy::Fixed { delay } => Some(delay),
            ReconnectPolicy::None => None,
        }
    }
}

/// One browser client's view of the build stream
#[derive(Debug, Clone)]
pub struct ClientRuntime {
    last_seen_version: u64,
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ClientRuntime {
    /// A client whose page was served at `version`
    pub fn new(version: u64, policy: ReconnectPolicy) -> Self {
        Self {
            last_seen_version: version,
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
        }
    }

    pub fn last_seen_version(&self) -> u64 {
        self.last_seen_version
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// A build finished on the server
    pub fn on_build(&mut self, version: u64, css_only: bool) -> ClientAction {
        if version <= self.last_seen_version {
            return ClientAction::Ignore;
        }
        self.last_seen_version = version;

        if css_only {
            ClientAction::PatchStylesheets { version }
        } else {
            ClientAction::FullReload
        }
    }

    /// Errors are logged, never acted on
    pub fn on_error(&mut self, message: &str) -> ClientAction {
        ClientAction::LogError(message.to_string())
    }

    /// The connection dropped; returns the delay before the next attempt
    pub fn on_close(&mut self) -> Option<Duration> {
        match self.policy.delay(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.state = ConnectionState::Disconnected;
                Some(delay)
            }
            None => {
                self.state = ConnectionState::GaveUp;
                None
            }
        }
    }

    /// Manual reconnect resets the attempt counter
    pub fn reconnect(&mut self) {
        self.attempts = 0;
        self.connect();
    }
}
