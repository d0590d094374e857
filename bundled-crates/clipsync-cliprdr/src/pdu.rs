//! Decoded CLIPRDR messages.
//!
//! These are the fixed-shape structures the channel library hands over after
//! parsing, and accepts for sending. Payload buffers are [`Bytes`] so a
//! response can be viewed by another thread without copying.

use bytes::Bytes;
use clipsync_core::ClipboardFormat;
use enumflags2::{bitflags, BitFlags};

// =============================================================================
// Capabilities
// =============================================================================

/// `CB_CAPS_VERSION_2`
pub const CB_CAPS_VERSION_2: u32 = 2;

/// One flag of the general capability set
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralCapabilityFlag {
    /// `CB_USE_LONG_FORMAT_NAMES`
    UseLongFormatNames = 0x0000_0002,
    /// `CB_STREAM_FILECLIP_ENABLED`
    StreamFileclipEnabled = 0x0000_0004,
    /// `CB_FILECLIP_NO_FILE_PATHS`
    FileclipNoFilePaths = 0x0000_0008,
    /// `CB_CAN_LOCK_CLIPDATA`
    CanLockClipdata = 0x0000_0010,
}

/// Flags of the general capability set
pub type GeneralCapabilityFlags = BitFlags<GeneralCapabilityFlag>;

/// One capability set of a capabilities PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    /// `CB_CAPSTYPE_GENERAL`
    General {
        /// Protocol version
        version: u32,
        /// General flags
        flags: GeneralCapabilityFlags,
    },
    /// A set type this side does not interpret
    Other {
        /// Raw capability set type
        kind: u16,
    },
}

/// Capabilities PDU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Capability sets in wire order
    pub sets: Vec<CapabilitySet>,
}

impl Capabilities {
    /// The capabilities this client always announces: long format names,
    /// streamed file copy, and no file paths in descriptors.
    pub fn client() -> Self {
        Self {
            sets: vec![CapabilitySet::General {
                version: CB_CAPS_VERSION_2,
                flags: GeneralCapabilityFlag::UseLongFormatNames
                    | GeneralCapabilityFlag::StreamFileclipEnabled
                    | GeneralCapabilityFlag::FileclipNoFilePaths,
            }],
        }
    }

    /// Flags of the first general capability set, if any
    pub fn general_flags(&self) -> Option<GeneralCapabilityFlags> {
        self.sets.iter().find_map(|set| match set {
            CapabilitySet::General { flags, .. } => Some(*flags),
            CapabilitySet::Other { .. } => None,
        })
    }
}

// =============================================================================
// Format List and Format Data
// =============================================================================

/// `msgFlags` of a response PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// `CB_RESPONSE_OK`
    Ok,
    /// `CB_RESPONSE_FAIL`
    Fail,
}

/// Format list PDU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormatList {
    /// Announced formats in wire order
    pub formats: Vec<ClipboardFormat>,
}

impl FormatList {
    /// Create a format list
    pub fn new(formats: Vec<ClipboardFormat>) -> Self {
        Self { formats }
    }

    /// Find the announced format carrying a registered name
    pub fn find_named(&self, name: &str) -> Option<&ClipboardFormat> {
        self.formats.iter().find(|format| format.has_name(name))
    }
}

/// Format data request PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDataRequest {
    /// Requested format id
    pub format_id: u32,
}

/// Format data response PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDataResponse {
    /// Response status
    pub status: ResponseStatus,
    /// Format data, empty on failure
    pub data: Bytes,
}

impl FormatDataResponse {
    /// Successful response carrying `data`
    pub fn ok(data: impl Into<Bytes>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            data: data.into(),
        }
    }

    /// Failed response
    pub fn fail() -> Self {
        Self {
            status: ResponseStatus::Fail,
            data: Bytes::new(),
        }
    }

    /// Returns true for an OK response with a non-empty payload
    pub fn has_data(&self) -> bool {
        self.status == ResponseStatus::Ok && !self.data.is_empty()
    }
}

// =============================================================================
// File Contents
// =============================================================================

/// One flag of a file contents request
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileContentsFlag {
    /// `FILECONTENTS_SIZE`
    Size = 0x0000_0001,
    /// `FILECONTENTS_RANGE`
    Range = 0x0000_0002,
}

/// `dwFlags` of a file contents request
pub type FileContentsFlags = BitFlags<FileContentsFlag>;

/// File contents request PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileContentsRequest {
    /// Stream identifier echoed in the response
    pub stream_id: u32,
    /// Index into the file group descriptor list
    pub list_index: u32,
    /// SIZE or RANGE
    pub flags: FileContentsFlags,
    /// Byte offset for RANGE requests
    pub position: u64,
    /// Requested byte count (8 for SIZE)
    pub requested: u32,
    /// Clipboard data lock id, when locking is in use
    pub clip_data_id: Option<u32>,
}

impl FileContentsRequest {
    /// Request the 64-bit size of file `list_index`
    pub fn size(stream_id: u32, list_index: u32) -> Self {
        Self {
            stream_id,
            list_index,
            flags: FileContentsFlag::Size.into(),
            position: 0,
            requested: 8,
            clip_data_id: None,
        }
    }

    /// Request `requested` bytes of file `list_index` starting at `position`
    pub fn range(stream_id: u32, list_index: u32, position: u64, requested: u32) -> Self {
        Self {
            stream_id,
            list_index,
            flags: FileContentsFlag::Range.into(),
            position,
            requested,
            clip_data_id: None,
        }
    }

    /// `nPositionHigh`
    pub fn position_high(&self) -> u32 {
        (self.position >> 32) as u32
    }

    /// `nPositionLow`
    pub fn position_low(&self) -> u32 {
        self.position as u32
    }
}

/// File contents response PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentsResponse {
    /// Response status
    pub status: ResponseStatus,
    /// Stream identifier of the request
    pub stream_id: u32,
    /// 8-byte size, or the requested range
    pub data: Bytes,
}

impl FileContentsResponse {
    /// Successful SIZE answer
    pub fn with_size(stream_id: u32, size: u64) -> Self {
        Self {
            status: ResponseStatus::Ok,
            stream_id,
            data: Bytes::copy_from_slice(&size.to_le_bytes()),
        }
    }

    /// Successful RANGE answer
    pub fn with_range(stream_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            status: ResponseStatus::Ok,
            stream_id,
            data: data.into(),
        }
    }

    /// Failed answer
    pub fn fail(stream_id: u32) -> Self {
        Self {
            status: ResponseStatus::Fail,
            stream_id,
            data: Bytes::new(),
        }
    }

    /// Interpret the payload of a SIZE answer; it must be exactly 8 bytes
    pub fn size_value(&self) -> Option<u64> {
        if self.status != ResponseStatus::Ok {
            return None;
        }
        <[u8; 8]>::try_from(self.data.as_ref()).ok().map(u64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_capabilities() {
        let caps = Capabilities::client();
        let flags = caps.general_flags().unwrap();
        assert_eq!(flags.bits(), 0x02 | 0x04 | 0x08);
        assert!(flags.contains(GeneralCapabilityFlag::StreamFileclipEnabled));
        assert!(!flags.contains(GeneralCapabilityFlag::CanLockClipdata));
    }

    #[test]
    fn test_general_flags_skips_other_sets() {
        let caps = Capabilities {
            sets: vec![
                CapabilitySet::Other { kind: 7 },
                CapabilitySet::General {
                    version: 1,
                    flags: GeneralCapabilityFlag::CanLockClipdata.into(),
                },
            ],
        };
        assert_eq!(caps.general_flags(), Some(GeneralCapabilityFlag::CanLockClipdata.into()));
        assert_eq!(Capabilities::default().general_flags(), None);
    }

    #[test]
    fn test_range_position_halves() {
        let req = FileContentsRequest::range(0, 3, (7u64 << 32) | 0x10, 4096);
        assert_eq!(req.position_high(), 7);
        assert_eq!(req.position_low(), 0x10);
        assert_eq!(req.flags, FileContentsFlags::from(FileContentsFlag::Range));
        assert!(!req.flags.contains(FileContentsFlag::Size));
    }

    #[test]
    fn test_wire_flags_drop_unknown_bits() {
        let flags = GeneralCapabilityFlags::from_bits_truncate(0x0000_0106);
        assert_eq!(
            flags,
            GeneralCapabilityFlag::UseLongFormatNames | GeneralCapabilityFlag::StreamFileclipEnabled
        );

        let both = FileContentsFlags::from_bits_truncate(0x0000_0003);
        assert!(both.contains(FileContentsFlag::Size | FileContentsFlag::Range));
        assert!(FileContentsFlags::from_bits_truncate(0x0000_0008).is_empty());
    }

    #[test]
    fn test_size_value() {
        assert_eq!(FileContentsResponse::with_size(0, 1 << 40).size_value(), Some(1 << 40));
        assert_eq!(FileContentsResponse::with_range(0, vec![1, 2, 3]).size_value(), None);
        assert_eq!(FileContentsResponse::fail(0).size_value(), None);
    }

    #[test]
    fn test_format_list_find_named() {
        let list = FormatList::new(vec![
            ClipboardFormat::new(13),
            ClipboardFormat::with_name(0xC0FE, "FileContents"),
        ]);
        assert_eq!(list.find_named("FileContents").map(|f| f.id), Some(0xC0FE));
        assert!(list.find_named("Preferred DropEffect").is_none());
    }

    #[test]
    fn test_format_data_response_has_data() {
        assert!(FormatDataResponse::ok(vec![1]).has_data());
        assert!(!FormatDataResponse::ok(Vec::new()).has_data());
        assert!(!FormatDataResponse::fail().has_data());
    }
}
