//! Development server command implementation

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::config::{Config, TransportKind};
use crate::server::DevServer;

/// Serve a directory and reload browsers when it changes
#[derive(Args, Debug)]
pub struct DevCommand {
    /// Port to run the dev server on [default: from config, else 3000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to [default: from config, else localhost]
    #[arg(long)]
    pub host: Option<String>,

    /// Directory to serve, overriding the config
    #[arg(long)]
    pub root: Option<String>,

    /// Live reload transport
    #[arg(short, long, value_enum, env = "DEV_RELOAD_TRANSPORT")]
    pub transport: Option<TransportKind>,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

impl DevCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        info!("Loading configuration from {}", config_path);
        let mut config = Config::load_or_default(config_path)?;
        self.apply_overrides(&mut config);
        config.validate()?;

        let options = DevServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            open: config.server.open,
        };

        eprintln!(
            "{} Starting dev server at {}\n",
            "→".blue(),
            format!("http://{}:{}", options.host, options.port)
                .cyan()
                .underline()
        );
        eprintln!(
            "  {} Serving {}",
            "•".dimmed(),
            config.root().display().to_string().dimmed()
        );
        eprintln!(
            "  {} Live reload over {}",
            "•".dimmed(),
            config.reload.transport.to_string().green()
        );
        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        let server = DevServer::new(Arc::new(config), options)?;
        server.start().await
    }

    /// Command-line flags win over the config file
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(root) = &self.root {
            config.server.root = root.clone();
        }
        if let Some(transport) = self.transport {
            config.reload.transport = transport;
        }
        if self.open {
            config.server.open = true;
        }
    }
}

/// Development server options
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
    pub open: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cmd = DevCommand {
            port: Some(8080),
            host: None,
            root: Some("public".to_string()),
            transport: Some(TransportKind::Polling),
            open: false,
        };
        let mut config = Config::default();
        cmd.apply_overrides(&mut config);

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.root, "public");
        assert_eq!(config.reload.transport, TransportKind::Polling);
    }
}
