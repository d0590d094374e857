//! Configuration management
//!
//! Handles loading and validation of configuration from TOML files. CLI
//! arguments override individual fields in the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod types;

pub use types::{ClipboardConfig, LoggingConfig, TransferConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Clipboard configuration
    #[serde(default)]
    pub clipboard: ClipboardConfig,
    /// File transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.clipboard.max_size == 0 {
            anyhow::bail!("clipboard.max_size must be greater than zero");
        }
        if self.clipboard.sync_timeout_ms == 0 {
            anyhow::bail!("clipboard.sync_timeout_ms must be greater than zero");
        }

        let transfer = &self.transfer;
        if transfer.initial_chunk_size == 0 {
            anyhow::bail!("transfer.initial_chunk_size must be greater than zero");
        }
        if transfer.initial_chunk_size > transfer.max_chunk_size {
            anyhow::bail!(
                "transfer.initial_chunk_size ({}) exceeds transfer.max_chunk_size ({})",
                transfer.initial_chunk_size,
                transfer.max_chunk_size
            );
        }
        if transfer.part_suffix.is_empty() || transfer.part_suffix.contains(['/', '\\']) {
            anyhow::bail!("Invalid transfer.part_suffix: {:?}", transfer.part_suffix);
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }
}
