//! Error types for CLIPRDR message handling.

use clipsync_core::ClipboardError;
use thiserror::Error;

/// Errors that can occur while exchanging CLIPRDR messages.
#[derive(Debug, Error)]
pub enum CliprdrError {
    /// Error from the format layer
    #[error("clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    /// The transport could not queue an outbound message
    #[error("transport error: {0}")]
    Transport(String),

    /// The channel was closed before the message could be delivered
    #[error("clipboard channel closed")]
    ChannelClosed,

    /// A file contents request carried an invalid flag combination
    #[error("invalid file contents flags: {0:#x}")]
    InvalidFlags(u32),

    /// A response arrived that no request was waiting for
    #[error("unexpected {0}")]
    Unexpected(&'static str),

    /// The local side rejected the message
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Result type for CLIPRDR operations.
pub type CliprdrResult<T> = Result<T, CliprdrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliprdrError::InvalidFlags(3);
        assert_eq!(err.to_string(), "invalid file contents flags: 0x3");

        let err = CliprdrError::Unexpected("format data response");
        assert_eq!(err.to_string(), "unexpected format data response");
    }

    #[test]
    fn test_from_clipboard_error() {
        let core_err = ClipboardError::UnsupportedFormat(13);
        let err: CliprdrError = core_err.into();
        assert!(matches!(err, CliprdrError::Clipboard(_)));
    }
}
