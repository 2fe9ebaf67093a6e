//! Configuration handling for dev-reload
//!
//! Parses and manages dev-reload.toml configuration files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use schema::*;

/// Default config file name, looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dev-reload.toml";

/// Validation failures for a loaded configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`reload.{0}` must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("served root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("`reload.stylesheet_extensions` must not contain empty entries")]
    EmptyExtension,

    #[error("`reload.placeholder` must not be empty")]
    EmptyPlaceholder,

    #[error("invalid ignore pattern `{pattern}`: {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Development server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Live reload settings
    #[serde(default)]
    pub reload: ReloadConfig,

    /// File watcher settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Directory containing the config file
    #[serde(skip)]
    pub base: PathBuf,
}

impl Config {
    /// Load and validate configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Self::read(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config file if present; the default file name may be absent
    ///
    /// Not validated, so command-line overrides can be applied first.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path == Path::new(DEFAULT_CONFIG_FILE) && !absolute(path)?.exists() {
            tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self {
                base: std::env::current_dir()?,
                ..Self::default()
            });
        }

        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let canonical_path = absolute(path)?;

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;

        // Relative paths in the file resolve against its directory
        config.base = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(config)
    }

    /// Parse configuration from TOML text without validating paths
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML, as written by `dev-reload init`
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("debounce_ms", self.reload.debounce_ms),
            ("heartbeat_ms", self.reload.heartbeat_ms),
            ("ping_interval_ms", self.reload.ping_interval_ms),
            ("poll_interval_ms", self.reload.poll_interval_ms),
            ("error_dedupe_ms", self.reload.error_dedupe_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ZeroInterval(name));
            }
        }

        if self.reload.stylesheet_extensions.iter().any(|ext| ext.is_empty()) {
            return Err(ConfigError::EmptyExtension);
        }

        if self.reload.placeholder.is_empty() {
            return Err(ConfigError::EmptyPlaceholder);
        }

        for pattern in &self.watch.ignore {
            globset::Glob::new(pattern).map_err(|source| ConfigError::IgnorePattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        let root = self.root();
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root));
        }

        Ok(())
    }

    /// Get the absolute directory that is served and watched
    pub fn root(&self) -> PathBuf {
        self.base.join(&self.server.root)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.reload.debounce_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.reload.heartbeat_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.reload.ping_interval_ms)
    }

    pub fn error_dedupe_window(&self) -> Duration {
        Duration::from_millis(self.reload.error_dedupe_ms)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
