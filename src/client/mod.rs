//! Browser client runtime
//!
//! [`runtime`] is the decision logic and reconnect schedule; [`scripts`]
//! renders it as the JavaScript injected into served pages.

pub mod runtime;
pub mod scripts;

pub use runtime::{ClientAction, ClientRuntime, ConnectionState, ReconnectPolicy};
pub use scripts::{client_script, inject_client, ScriptOptions};
