//! # rdp-clipsync
//!
//! Clipboard synchronization for an RDP session over the CLIPRDR virtual
//! channel.
//!
//! This crate integrates:
//! - [`clipsync_core`] - Format mapping and payload transcoding
//! - [`clipsync_cliprdr`] - CLIPRDR messages and transport seams
//!
//! # Architecture
//!
//! ```text
//! rdp-clipsync
//!   ├─> CliprdrClient (negotiation, sync fetch, entry points)
//!   ├─> Session (fetch state, negotiated file formats, transfer slot)
//!   ├─> Download worker (FileGroupDescriptorW, SIZE/RANGE loop, .part files)
//!   └─> UI thread (LocalClipboard, paste status)
//! ```
//!
//! # Data Flow
//!
//! **Local to remote:** LocalClipboard → UiJob → CliprdrClient → RemoteTransport
//!
//! **Remote to local:** CliprdrHandler → Session → UiJob → LocalClipboard
//!
//! **Files:** CliprdrHandler → rendezvous → Download worker → destination directory

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Clipboard client, session state and file transfer
pub mod clipboard;

/// Configuration
pub mod config;

/// In-process remote peer and memory clipboard
pub mod loopback;
