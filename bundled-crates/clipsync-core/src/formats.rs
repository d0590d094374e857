//! Clipboard format mapping and text transcoding.
//!
//! This module handles translation between local clipboard target names and
//! CLIPRDR format ids, the CRLF / UTF-16LE text conventions used on the wire,
//! and the FILEDESCRIPTORW structures used for file copy.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::{ClipboardError, ClipboardResult};

// =============================================================================
// Windows Clipboard Format IDs
// =============================================================================

/// Standard Windows clipboard format: ANSI text
pub const CF_TEXT: u32 = 1;

/// Standard Windows clipboard format: Device-independent bitmap
pub const CF_DIB: u32 = 8;

/// Standard Windows clipboard format: Unicode text (UTF-16LE)
pub const CF_UNICODETEXT: u32 = 13;

/// Standard Windows clipboard format: DIBV5 (124-byte header, alpha)
pub const CF_DIBV5: u32 = 17;

/// Custom format: HTML
pub const CF_HTML: u32 = 0xD010;

/// Custom format: PNG image
pub const CF_PNG: u32 = 0xD011;

/// Custom format: JPEG image
pub const CF_JPEG: u32 = 0xD012;

/// Custom format: URI list, announced under the name [`FORMAT_NAME_FILE_GROUP_DESCRIPTOR`]
pub const CF_TEXTURILIST: u32 = 0xD014;

/// Registered name of the file list pseudo-format
pub const FORMAT_NAME_FILE_GROUP_DESCRIPTOR: &str = "FileGroupDescriptorW";

/// Registered name of the file data pseudo-format
pub const FORMAT_NAME_FILE_CONTENTS: &str = "FileContents";

/// Registered name of the drop effect pseudo-format
pub const FORMAT_NAME_PREFERRED_DROP_EFFECT: &str = "Preferred DropEffect";

/// `dwFileAttributes` bit marking a directory entry
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;

const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;

/// Size of one FILEDESCRIPTORW record
pub const FILE_DESCRIPTOR_SIZE: usize = 592;

// =============================================================================
// Clipboard Format
// =============================================================================

/// A remote clipboard format with ID and optional name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipboardFormat {
    /// Windows clipboard format ID
    pub id: u32,

    /// Format name (for registered formats)
    pub name: Option<String>,
}

impl ClipboardFormat {
    /// Create a new clipboard format with ID only
    pub fn new(id: u32) -> Self {
        Self { id, name: None }
    }

    /// Create a new clipboard format with ID and name
    pub fn with_name(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }

    /// Returns true if this format carries the given registered name
    pub fn has_name(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }
}

// =============================================================================
// Local Types
// =============================================================================

/// The fixed set of local clipboard types this crate knows how to bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalType {
    /// UTF-8 plain text
    Utf8Text,
    /// Legacy plain text
    Text,
    /// HTML markup
    Html,
    /// PNG image
    Png,
    /// JPEG image
    Jpeg,
    /// Windows bitmap
    Bitmap,
    /// `text/uri-list` of local files
    UriList,
    /// Marker for files copied on the remote side
    CopiedFiles,
}

impl LocalType {
    /// Every local type, in announcement order
    pub const ALL: [LocalType; 8] = [
        LocalType::Utf8Text,
        LocalType::Text,
        LocalType::Html,
        LocalType::Png,
        LocalType::Jpeg,
        LocalType::Bitmap,
        LocalType::UriList,
        LocalType::CopiedFiles,
    ];

    /// Resolve a local clipboard target name
    pub fn from_target(name: &str) -> Option<Self> {
        match name {
            "UTF8_STRING" | "text/plain;charset=utf-8" => Some(Self::Utf8Text),
            "TEXT" | "text/plain" => Some(Self::Text),
            "text/html" => Some(Self::Html),
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            "image/bmp" => Some(Self::Bitmap),
            "text/uri-list" => Some(Self::UriList),
            "x-special/rdp-copied-files" => Some(Self::CopiedFiles),
            _ => None,
        }
    }

    /// Canonical target name used when offering this type locally
    pub fn target_name(self) -> &'static str {
        match self {
            Self::Utf8Text => "UTF8_STRING",
            Self::Text => "TEXT",
            Self::Html => "text/html",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bitmap => "image/bmp",
            Self::UriList => "text/uri-list",
            Self::CopiedFiles => "x-special/rdp-copied-files",
        }
    }

    /// Remote format id announced for this type, if it has one
    pub fn remote_format(self) -> Option<u32> {
        match self {
            Self::Utf8Text => Some(CF_UNICODETEXT),
            Self::Text => Some(CF_TEXT),
            Self::Html => Some(CF_HTML),
            Self::Png => Some(CF_PNG),
            Self::Jpeg => Some(CF_JPEG),
            Self::Bitmap => Some(CF_DIB),
            Self::UriList => Some(CF_TEXTURILIST),
            Self::CopiedFiles => None,
        }
    }

    /// Returns true for types carried as decoded images
    pub fn is_image(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg | Self::Bitmap)
    }

    /// Returns true for types carried as text
    pub fn is_text(self) -> bool {
        matches!(self, Self::Utf8Text | Self::Text | Self::Html)
    }
}

/// Map a local clipboard target name to the remote format id to announce.
///
/// Unknown targets map to `None` and must be left out of any format list.
///
/// # Example
///
/// ```
/// use clipsync_core::formats::{map_local_type_to_remote, CF_DIB, CF_HTML};
///
/// assert_eq!(map_local_type_to_remote("text/html"), Some(CF_HTML));
/// assert_eq!(map_local_type_to_remote("image/bmp"), Some(CF_DIB));
/// assert_eq!(map_local_type_to_remote("x-application/foo"), None);
/// ```
pub fn map_local_type_to_remote(target: &str) -> Option<u32> {
    LocalType::from_target(target).and_then(LocalType::remote_format)
}

/// Reverse lookup used when parsing a remote format list
pub fn local_type_for_remote(format_id: u32) -> Option<LocalType> {
    match format_id {
        CF_UNICODETEXT => Some(LocalType::Utf8Text),
        CF_TEXT => Some(LocalType::Text),
        CF_HTML => Some(LocalType::Html),
        CF_PNG => Some(LocalType::Png),
        CF_JPEG => Some(LocalType::Jpeg),
        CF_DIB | CF_DIBV5 => Some(LocalType::Bitmap),
        CF_TEXTURILIST => Some(LocalType::UriList),
        _ => None,
    }
}

/// Lookup by registered name, for servers that number these formats dynamically
pub fn local_type_for_remote_name(name: &str) -> Option<LocalType> {
    match name {
        "HTML Format" => Some(LocalType::Html),
        "PNG" => Some(LocalType::Png),
        "JFIF" => Some(LocalType::Jpeg),
        _ => None,
    }
}

// =============================================================================
// Text Transcoding
// =============================================================================

/// Convert LF line endings to the CRLF convention of the remote clipboard.
///
/// The result is at most `2 * input.len() + 1` bytes; the extra byte is
/// reserved for a terminator appended by the caller.
pub fn encode_text_for_wire(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 2 + 1);
    for &byte in input {
        if byte == b'\n' {
            out.push(b'\r');
        }
        out.push(byte);
    }
    out
}

/// Strip every CR byte, reusing the buffer.
pub fn decode_text_from_wire(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.retain(|&b| b != b'\r');
    bytes
}

/// Handles text payload conversion for the text formats
#[derive(Debug, Clone)]
pub struct FormatConverter {
    /// Maximum data size for conversion
    pub max_size: usize,
}

impl Default for FormatConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatConverter {
    /// Create a new format converter with default settings
    pub fn new() -> Self {
        Self {
            max_size: 16 * 1024 * 1024, // 16MB
        }
    }

    /// Create a format converter with custom max size
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    fn check_size(&self, actual: usize) -> ClipboardResult<()> {
        if actual > self.max_size {
            return Err(ClipboardError::DataSizeExceeded {
                actual,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Encode local UTF-8 text for the given remote text format.
    ///
    /// Line endings become CRLF and a NUL terminator is appended (two bytes
    /// for `CF_UNICODETEXT`).
    pub fn encode_text(&self, format_id: u32, text: &str) -> ClipboardResult<Vec<u8>> {
        self.check_size(text.len())?;

        let crlf = encode_text_for_wire(text.as_bytes());
        match format_id {
            CF_UNICODETEXT => {
                // encode_text_for_wire only inserts ASCII bytes, so this cannot fail
                let crlf = String::from_utf8(crlf).map_err(|_| ClipboardError::FormatConversion("CRLF".into()))?;
                let mut out: Vec<u8> = crlf.encode_utf16().flat_map(u16::to_le_bytes).collect();
                out.extend_from_slice(&[0, 0]);
                Ok(out)
            }
            CF_TEXT | CF_HTML => {
                let mut out = crlf;
                out.push(0);
                Ok(out)
            }
            other => Err(ClipboardError::UnsupportedFormat(other)),
        }
    }

    /// Decode a remote text payload into local UTF-8 text with LF endings.
    pub fn decode_text(&self, format_id: u32, data: &[u8]) -> ClipboardResult<String> {
        self.check_size(data.len())?;

        match format_id {
            CF_UNICODETEXT => {
                if data.len() % 2 != 0 {
                    return Err(ClipboardError::InvalidUtf16);
                }
                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .take_while(|&unit| unit != 0)
                    .collect();
                let mut text = String::from_utf16(&units).map_err(|_| ClipboardError::InvalidUtf16)?;
                text.retain(|c| c != '\r');
                Ok(text)
            }
            CF_TEXT | CF_HTML => {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                let bytes = decode_text_from_wire(data[..end].to_vec());
                Ok(String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
            }
            other => Err(ClipboardError::UnsupportedFormat(other)),
        }
    }
}

// =============================================================================
// URI Lists
// =============================================================================

/// Extract local paths from a `text/uri-list` payload.
///
/// Comment lines and non-`file://` URIs are skipped.
pub fn parse_uri_list(list: &str) -> Vec<PathBuf> {
    list.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("file://"))
        .map(|rest| rest.strip_prefix("localhost").unwrap_or(rest))
        .filter(|path| path.starts_with('/'))
        .map(|path| PathBuf::from(percent_decode_str(path).decode_utf8_lossy().into_owned()))
        .collect()
}

// =============================================================================
// Drop Effect
// =============================================================================

/// Interpretation of a "Preferred DropEffect" payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropEffect {
    /// DROPEFFECT_NONE
    None,
    /// DROPEFFECT_COPY
    Copy,
    /// DROPEFFECT_MOVE
    Move,
    /// DROPEFFECT_LINK
    Link,
}

impl DropEffect {
    /// Decode from a raw 32-bit DROPEFFECT code
    pub fn from_code(code: u32) -> Self {
        if code & 0x2 != 0 {
            Self::Move
        } else if code & 0x1 != 0 {
            Self::Copy
        } else if code & 0x4 != 0 {
            Self::Link
        } else {
            Self::None
        }
    }

    /// Decode a format-data payload; anything other than exactly 4 bytes means copy
    pub fn from_payload(data: &[u8]) -> Self {
        match <[u8; 4]>::try_from(data) {
            Ok(raw) => Self::from_code(u32::from_le_bytes(raw)),
            Err(_) => Self::Copy,
        }
    }
}

// =============================================================================
// File Transfer Structures
// =============================================================================

/// File descriptor from a FileGroupDescriptorW list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// `dwFlags` bits indicating which fields are valid
    pub flags: u32,

    /// File attributes (Windows FILE_ATTRIBUTE_*)
    pub attributes: u32,

    /// Last write time (FILETIME) when flagged
    pub write_time: Option<u64>,

    /// File size in bytes
    pub size: u64,

    /// Relative path, `\` separated, UTF-16 decoded
    pub name: String,
}

impl FileDescriptor {
    /// FD_ATTRIBUTES
    pub const FLAG_ATTRIBUTES: u32 = 0x0000_0004;
    /// FD_WRITESTIME
    pub const FLAG_WRITESTIME: u32 = 0x0000_0020;
    /// FD_FILESIZE
    pub const FLAG_FILESIZE: u32 = 0x0000_0040;

    /// Returns true for directory entries
    pub fn is_directory(&self) -> bool {
        self.attributes & FILE_ATTRIBUTE_DIRECTORY != 0
    }

    /// Parse a single FILEDESCRIPTORW structure
    ///
    /// # Format (592 bytes total)
    /// ```text
    /// Offset | Size | Field
    /// -------|------|------
    /// 0      | 4    | dwFlags
    /// 4      | 32   | clsid, sizel, pointl (unused)
    /// 36     | 4    | dwFileAttributes
    /// 40     | 16   | ftCreationTime, ftLastAccessTime
    /// 56     | 8    | ftLastWriteTime
    /// 64     | 4    | nFileSizeHigh
    /// 68     | 4    | nFileSizeLow
    /// 72     | 520  | cFileName (UTF-16, 260 chars max)
    /// ```
    pub fn parse(data: &[u8]) -> ClipboardResult<Self> {
        if data.len() < FILE_DESCRIPTOR_SIZE {
            return Err(ClipboardError::FormatConversion(format!(
                "FILEDESCRIPTORW too small: {} bytes (need {})",
                data.len(),
                FILE_DESCRIPTOR_SIZE
            )));
        }

        let flags = read_u32(data, 0);
        let attributes = read_u32(data, 36);
        let write_time = (flags & Self::FLAG_WRITESTIME != 0)
            .then(|| (u64::from(read_u32(data, 60)) << 32) | u64::from(read_u32(data, 56)));
        let size = (u64::from(read_u32(data, 64)) << 32) | u64::from(read_u32(data, 68));

        let units: Vec<u16> = data[72..FILE_DESCRIPTOR_SIZE]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        // an unpaired surrogate in one name must not reject the whole list
        let name = String::from_utf16_lossy(&units);

        Ok(Self {
            flags,
            attributes,
            write_time,
            size,
            name,
        })
    }

    /// Parse a FileGroupDescriptorW payload (`cItems` followed by records)
    pub fn parse_list(data: &[u8]) -> ClipboardResult<Vec<Self>> {
        if data.len() < 4 {
            return Err(ClipboardError::FormatConversion(
                "FileGroupDescriptorW too small for count".to_string(),
            ));
        }

        let count = read_u32(data, 0) as usize;
        let expected = count
            .checked_mul(FILE_DESCRIPTOR_SIZE)
            .and_then(|n| n.checked_add(4))
            .ok_or_else(|| ClipboardError::FormatConversion(format!("descriptor count {} overflows", count)))?;
        if data.len() < expected {
            return Err(ClipboardError::FormatConversion(format!(
                "FileGroupDescriptorW too small: {} bytes (need {} for {} files)",
                data.len(),
                expected,
                count
            )));
        }

        data[4..expected]
            .chunks_exact(FILE_DESCRIPTOR_SIZE)
            .map(Self::parse)
            .collect()
    }

    /// Describe a local path.
    ///
    /// Only the final path component is announced; characters Windows
    /// rejects in file names are replaced with `_`.
    pub fn from_path(path: &Path) -> ClipboardResult<Self> {
        let metadata = std::fs::metadata(path)?;
        let raw_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClipboardError::FormatConversion(format!("no usable file name in {}", path.display())))?;

        let name = raw_name
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();

        Ok(Self {
            flags: Self::FLAG_ATTRIBUTES | Self::FLAG_FILESIZE,
            attributes: if metadata.is_dir() {
                FILE_ATTRIBUTE_DIRECTORY
            } else {
                FILE_ATTRIBUTE_NORMAL
            },
            write_time: None,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            name,
        })
    }

    /// Encode as one FILEDESCRIPTORW record. Names longer than 259 UTF-16
    /// units are truncated.
    pub fn encode(&self) -> [u8; FILE_DESCRIPTOR_SIZE] {
        let mut record = [0u8; FILE_DESCRIPTOR_SIZE];
        let mut flags = self.flags;
        if let Some(time) = self.write_time {
            flags |= Self::FLAG_WRITESTIME;
            record[56..60].copy_from_slice(&(time as u32).to_le_bytes());
            record[60..64].copy_from_slice(&((time >> 32) as u32).to_le_bytes());
        }
        record[0..4].copy_from_slice(&flags.to_le_bytes());
        record[36..40].copy_from_slice(&self.attributes.to_le_bytes());
        record[64..68].copy_from_slice(&((self.size >> 32) as u32).to_le_bytes());
        record[68..72].copy_from_slice(&(self.size as u32).to_le_bytes());

        // 259 units leaves room for the terminator already present in the zeroed buffer
        for (i, unit) in self.name.encode_utf16().take(259).enumerate() {
            let offset = 72 + i * 2;
            record[offset..offset + 2].copy_from_slice(&unit.to_le_bytes());
        }

        record
    }

    /// Encode a FileGroupDescriptorW payload
    pub fn encode_list(descriptors: &[FileDescriptor]) -> ClipboardResult<Vec<u8>> {
        let count = u32::try_from(descriptors.len())
            .map_err(|_| ClipboardError::FormatConversion(format!("too many files: {}", descriptors.len())))?;
        let mut data = Vec::with_capacity(4 + descriptors.len() * FILE_DESCRIPTOR_SIZE);
        data.extend_from_slice(&count.to_le_bytes());
        for descriptor in descriptors {
            data.extend_from_slice(&descriptor.encode());
        }
        Ok(data)
    }

    /// Build a FileGroupDescriptorW payload for a list of local paths
    pub fn build_list(paths: &[PathBuf]) -> ClipboardResult<Vec<u8>> {
        let descriptors = paths
            .iter()
            .map(|path| Self::from_path(path))
            .collect::<ClipboardResult<Vec<_>>>()?;
        Self::encode_list(&descriptors)
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

// =============================================================================
// Tests
// =============================================================================
