//! Configuration defaults.
//!
//! TOML-based defaults loaded from `~/.config/tug/config.toml`. Every key is
//! optional; CLI flags override file values. Missing file means built-in
//! defaults.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("refresh_interval_ms must be between 100 and 60000, got {0}")]
    InvalidRefreshInterval(u64),

    #[error("connections must be between 1 and 1000, got {0}")]
    InvalidConnections(usize),

    #[error("uploads must be between 1 and 100, got {0}")]
    InvalidUploads(usize),
}

/// Main configuration for the tug CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Terminal output settings.
    pub ui: UiConfig,

    /// Stream server settings.
    pub stream: StreamConfig,

    /// Transfer engine settings.
    pub transfer: TransferConfig,
}

/// Terminal output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    /// Suppress progress output and banners.
    pub quiet: bool,

    /// Progress render cadence in milliseconds.
    pub refresh_interval_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            refresh_interval_ms: 1000,
        }
    }
}

/// Stream server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Port used by `-S` when none is given.
    pub default_port: u16,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { default_port: 8888 }
    }
}

/// Transfer engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Peer connection limit.
    pub connections: usize,

    /// Upload slot limit.
    pub uploads: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connections: 100,
            uploads: 10,
        }
    }
}

impl Config {
    /// Default configuration file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tug").join("config.toml"))
    }

    /// Loads the configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Loads the default config file, falling back to built-in defaults when
    /// it does not exist.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validates every configurable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=60_000).contains(&self.ui.refresh_interval_ms) {
            return Err(ConfigError::InvalidRefreshInterval(
                self.ui.refresh_interval_ms,
            ));
        }
        if !(1..=1000).contains(&self.transfer.connections) {
            return Err(ConfigError::InvalidConnections(self.transfer.connections));
        }
        if !(1..=100).contains(&self.transfer.uploads) {
            return Err(ConfigError::InvalidUploads(self.transfer.uploads));
        }
        Ok(())
    }
}
