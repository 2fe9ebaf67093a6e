//! dev-reload library
//!
//! Debounced live reload for development servers: file changes are
//! coalesced into versioned builds and delivered to browsers over polling,
//! server-sent events or a plain WebSocket.

pub mod cli;
pub mod client;
pub mod config;
pub mod reload;
pub mod server;
pub mod transport;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use reload::ReloadContext;
pub use transport::Transport;
