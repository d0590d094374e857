//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Clipboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// Enable clipboard synchronization
    pub enabled: bool,

    /// Maximum clipboard data size in bytes
    pub max_size: usize,

    /// How long `request_data` blocks for the remote answer.
    /// Default: 2000. A late answer is still installed when it arrives.
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

fn default_sync_timeout_ms() -> u64 {
    2000
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 16 * 1024 * 1024,
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

/// File transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// First RANGE request size in bytes
    #[serde(default = "default_initial_chunk_size")]
    pub initial_chunk_size: u32,

    /// Upper bound for the adaptive chunk size
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u32,

    /// Round trips faster than this double the chunk size
    #[serde(default = "default_fast_round_trip_ms")]
    pub fast_round_trip_ms: u64,

    /// Suffix of the staging file written next to each destination
    #[serde(default = "default_part_suffix")]
    pub part_suffix: String,

    /// Default paste destination (None = platform download directory)
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_initial_chunk_size() -> u32 {
    0x4000
}

fn default_max_chunk_size() -> u32 {
    0x0200_0000
}

fn default_fast_round_trip_ms() -> u64 {
    1000
}

fn default_part_suffix() -> String {
    ".part".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            initial_chunk_size: default_initial_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            fast_round_trip_ms: default_fast_round_trip_ms(),
            part_suffix: default_part_suffix(),
            download_dir: None,
        }
    }
}

impl TransferConfig {
    /// Paste destination to use when none is given
    pub fn resolved_download_dir(&self) -> Option<PathBuf> {
        self.download_dir.clone().or_else(dirs::download_dir)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    pub level: String,

    /// Directory for log files (None = console only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}
