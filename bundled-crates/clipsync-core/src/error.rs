//! Error types for format conversion.

use thiserror::Error;

/// Result type for format operations
pub type ClipboardResult<T> = std::result::Result<T, ClipboardError>;

/// Errors that can occur while mapping or transcoding clipboard data
#[derive(Error, Debug)]
pub enum ClipboardError {
    /// Format conversion failed
    #[error("format conversion failed: {0}")]
    FormatConversion(String),

    /// Format id has no local representation
    #[error("unsupported format: {0:#06x}")]
    UnsupportedFormat(u32),

    /// Invalid UTF-16 data
    #[error("invalid UTF-16 data")]
    InvalidUtf16,

    /// Device-independent bitmap could not be interpreted
    #[error("invalid bitmap: {0}")]
    InvalidBitmap(String),

    /// Image decode error
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Image encode error
    #[error("image encode error: {0}")]
    ImageEncode(String),

    /// Data size exceeded maximum
    #[error("data size {actual} exceeds maximum {max}")]
    DataSizeExceeded {
        /// Actual size in bytes
        actual: usize,
        /// Maximum allowed size in bytes
        max: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClipboardError {
    /// Returns true if this error indicates malformed or unsupported data
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::FormatConversion(_)
                | Self::UnsupportedFormat(_)
                | Self::InvalidUtf16
                | Self::InvalidBitmap(_)
                | Self::ImageDecode(_)
                | Self::ImageEncode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClipboardError::UnsupportedFormat(0xD014);
        assert_eq!(err.to_string(), "unsupported format: 0xd014");

        let err = ClipboardError::DataSizeExceeded { actual: 10, max: 4 };
        assert_eq!(err.to_string(), "data size 10 exceeds maximum 4");
    }

    #[test]
    fn test_is_format_error() {
        assert!(ClipboardError::InvalidUtf16.is_format_error());
        assert!(ClipboardError::InvalidBitmap("short".to_string()).is_format_error());
        assert!(!ClipboardError::DataSizeExceeded { actual: 2, max: 1 }.is_format_error());
    }
}
