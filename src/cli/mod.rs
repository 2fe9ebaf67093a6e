//! Command-line interface for dev-reload
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `dev`: Development server with live reload
//! - `init`: Write a starter config file
//! - `script`: Print the browser runtime for embedding elsewhere

mod dev;
mod init;
mod script;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use dev::{DevCommand, DevServerOptions};
pub use init::InitCommand;
pub use script::ScriptCommand;

use crate::config::DEFAULT_CONFIG_FILE;

/// dev-reload - debounced live reload over polling, SSE or WebSocket
#[derive(Parser, Debug)]
#[command(name = "dev-reload")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to dev-reload.toml config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve a directory and reload browsers when it changes
    Dev(DevCommand),

    /// Write a starter dev-reload.toml
    Init(InitCommand),

    /// Print the browser runtime for a transport
    Script(ScriptCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Dev(cmd) => {
                print_banner();
                cmd.execute(&self.config).await
            }
            Commands::Init(cmd) => {
                print_banner();
                cmd.execute().await
            }
            // Output is meant to be piped, so no banner
            Commands::Script(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the dev-reload banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "↻".cyan(),
        "dev-reload".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
