//! Clipboard Synchronization Module
//!
//! Bridges the local clipboard and a remote RDP peer over the CLIPRDR
//! virtual channel: text and images in both directions, and streamed file
//! copy from the remote into a local directory.
//!
//! # Architecture
//!
//! Format mapping and the wire message model come from the bundled crates:
//!
//! - [`clipsync_core`] - Format ids, text transcoding, bitmaps, file descriptors
//! - [`clipsync_cliprdr`] - Decoded PDUs and the transport seams
//!
//! This module adds:
//!
//! - [`CliprdrClient`] - Entry points and the transport callback table
//! - [`Session`] - Per-connection fetch state and transfer slot
//! - [`UiJob`] / [`UiHandle`] - Work posted to the UI thread
//!
//! # Threads
//!
//! ```text
//! Transport thread          UI thread                 Download worker
//! ━━━━━━━━━━━━━━━━          ━━━━━━━━━                 ━━━━━━━━━━━━━━━
//!
//! on_format_list ───UiJob::OfferRemoteTargets──> LocalClipboard
//!
//!                           request_data ─────> send request
//!                                 │ (condvar, 2s)
//! on_format_data_response ────────┘
//!
//!                           paste_files ──spawn──> drop effect, descriptors
//! on_file_contents_response ──rendezvous──────────> SIZE / RANGE loop
//!                           <────────────ack──────  .part -> rename
//! ```

pub mod error;
pub mod session;
pub mod ui;

mod client;
mod download;
mod exchange;
mod negotiation;
mod rendezvous;

pub use client::CliprdrClient;
pub use error::{ClipSyncError, Result};
pub use session::{FileFormats, NegotiatedFormats, PendingFetch, Session};
pub use ui::{
    spawn_ui_thread, ClipContent, LocalClipboard, PasteFilesStatus, PasteStatusSink, RemoteTarget, UiHandle, UiJob,
};
