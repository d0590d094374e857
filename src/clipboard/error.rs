//! Clipboard Error Types

use std::path::PathBuf;
use std::time::Duration;

use clipsync_cliprdr::CliprdrError;
use clipsync_core::ClipboardError;
use thiserror::Error;

/// Result type for clipboard synchronization operations
pub type Result<T> = std::result::Result<T, ClipSyncError>;

/// Clipboard synchronization error types
#[derive(Error, Debug)]
pub enum ClipSyncError {
    /// Another fetch or transfer already owns the channel
    #[error("Clipboard channel busy")]
    Busy,

    /// The remote did not answer a synchronous request in time
    #[error("Data not transferred within {}s, try again", .0.as_secs_f32())]
    Timeout(Duration),

    /// The remote has not announced the file pseudo-formats
    #[error("No files on the remote clipboard")]
    NoFileData,

    /// A file transfer stopped before completing
    #[error("File transfer failed: {0}")]
    TransferFailed(String),

    /// A file contents request named a file this side never announced
    #[error("Unknown file index: {0}")]
    UnknownFile(u32),

    /// Paste destination is unusable
    #[error("Invalid destination: {0:?}")]
    InvalidDestination(PathBuf),

    /// The UI thread has gone away
    #[error("UI thread unavailable")]
    UiUnavailable,

    /// Error from the transport
    #[error("Transport error: {0}")]
    Transport(#[from] CliprdrError),

    /// Error from the format layer
    #[error("Format error: {0}")]
    Format(#[from] ClipboardError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClipSyncError {
    /// Returns true if repeating the operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout(_))
    }
}
