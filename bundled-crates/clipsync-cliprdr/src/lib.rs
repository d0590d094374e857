//! # clipsync-cliprdr
//!
//! Message model and transport seams for the RDP clipboard virtual channel.
//!
//! The channel library that frames and parses CLIPRDR PDUs is treated as an
//! opaque collaborator. This crate fixes the shape of what crosses that
//! boundary:
//!
//! - **[`pdu`]** - Decoded capability, format list, format data and file
//!   contents messages
//! - **[`RemoteTransport`]** - Messages this side sends to the remote peer
//! - **[`CliprdrHandler`]** - Callbacks the transport invokes for messages
//!   the remote peer sends
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       clipsync-cliprdr                        │
//! │                                                               │
//! │   transport thread ──► CliprdrHandler::on_*  ──► session      │
//! │                                                   │           │
//! │   remote peer ◄────── RemoteTransport::send_* ◄───┘           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handler callbacks run on the transport's I/O thread. Their return value is
//! the status the transport reports for the message.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod error;
mod transport;

pub mod pdu;

pub use error::{CliprdrError, CliprdrResult};
pub use pdu::{
    Capabilities, CapabilitySet, FileContentsFlag, FileContentsFlags, FileContentsRequest, FileContentsResponse,
    FormatDataRequest, FormatDataResponse, FormatList, GeneralCapabilityFlag, GeneralCapabilityFlags, ResponseStatus,
};
pub use transport::{CliprdrHandler, RemoteTransport};
