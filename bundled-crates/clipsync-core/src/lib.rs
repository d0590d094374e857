//! # clipsync-core
//!
//! Format mapping for RDP clipboard redirection (CLIPRDR).
//!
//! This crate is the leaf of the clipsync stack and has no knowledge of
//! threads, transports or GUI toolkits:
//!
//! - **[`LocalType`]** - Local clipboard targets and their remote format ids
//! - **[`FormatConverter`]** - Text transcoding (CRLF, UTF-16LE) with size limits
//! - **[`FileDescriptor`]** - FILEDESCRIPTORW parsing and building
//! - **[`image`]** - Bitmap header synthesis and image encode/decode
//!
//! ## Quick Start
//!
//! ```rust
//! use clipsync_core::formats::{map_local_type_to_remote, CF_UNICODETEXT};
//! use clipsync_core::{decode_text_from_wire, encode_text_for_wire};
//!
//! assert_eq!(map_local_type_to_remote("UTF8_STRING"), Some(CF_UNICODETEXT));
//! assert_eq!(map_local_type_to_remote("application/x-unknown"), None);
//!
//! let wire = encode_text_for_wire(b"one\ntwo");
//! assert_eq!(wire, b"one\r\ntwo");
//! assert_eq!(decode_text_from_wire(wire), b"one\ntwo");
//! ```
//!
//! ## Feature Flags
//!
//! - `image` - Enable bitmap wrapping and PNG/JPEG/BMP conversion

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod error;

pub mod formats;

#[cfg(feature = "image")]
pub mod image;

pub use error::{ClipboardError, ClipboardResult};
pub use formats::{
    decode_text_from_wire, encode_text_for_wire, local_type_for_remote, local_type_for_remote_name,
    map_local_type_to_remote, parse_uri_list, ClipboardFormat, DropEffect, FileDescriptor, FormatConverter,
    LocalType, CF_DIB, CF_DIBV5, CF_HTML, CF_JPEG, CF_PNG, CF_TEXT, CF_TEXTURILIST, CF_UNICODETEXT,
    FORMAT_NAME_FILE_CONTENTS, FORMAT_NAME_FILE_GROUP_DESCRIPTOR, FORMAT_NAME_PREFERRED_DROP_EFFECT,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::formats::{local_type_for_remote, local_type_for_remote_name, map_local_type_to_remote};
    pub use crate::{ClipboardError, ClipboardFormat, ClipboardResult, FormatConverter, LocalType};
}
