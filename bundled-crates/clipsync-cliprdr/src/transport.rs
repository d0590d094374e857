//! Transport seams.

use crate::error::CliprdrResult;
use crate::pdu::{
    Capabilities, FileContentsRequest, FileContentsResponse, FormatDataRequest, FormatDataResponse, FormatList,
    ResponseStatus,
};

/// Outbound side of the clipboard channel.
///
/// Implementations queue the message for the transport's I/O thread and
/// return without waiting for the remote peer. They may be called from any
/// thread.
pub trait RemoteTransport: Send + Sync {
    /// Send the client capabilities PDU
    fn send_capabilities(&self, capabilities: Capabilities) -> CliprdrResult<()>;

    /// Announce the local clipboard formats
    fn send_format_list(&self, list: FormatList) -> CliprdrResult<()>;

    /// Acknowledge a remote format list
    fn send_format_list_response(&self, status: ResponseStatus) -> CliprdrResult<()>;

    /// Ask the remote peer for clipboard data
    fn send_format_data_request(&self, request: FormatDataRequest) -> CliprdrResult<()>;

    /// Answer a remote format data request
    fn send_format_data_response(&self, response: FormatDataResponse) -> CliprdrResult<()>;

    /// Ask the remote peer for a file size or byte range
    fn send_file_contents_request(&self, request: FileContentsRequest) -> CliprdrResult<()>;

    /// Answer a remote file contents request
    fn send_file_contents_response(&self, response: FileContentsResponse) -> CliprdrResult<()>;
}

/// Inbound side of the clipboard channel.
///
/// The transport invokes these on its I/O thread, one at a time. The returned
/// result is the status reported back to the transport for that message.
/// Borrowed payloads stay valid until the callback returns.
pub trait CliprdrHandler: Send + Sync {
    /// The channel is established and the remote is ready for capabilities
    fn on_monitor_ready(&self) -> CliprdrResult<()>;

    /// The remote announced its capabilities
    fn on_capabilities(&self, capabilities: &Capabilities) -> CliprdrResult<()>;

    /// The remote clipboard changed
    fn on_format_list(&self, list: &FormatList) -> CliprdrResult<()>;

    /// The remote acknowledged our format list
    fn on_format_list_response(&self, status: ResponseStatus) -> CliprdrResult<()>;

    /// The remote wants local clipboard data
    fn on_format_data_request(&self, request: &FormatDataRequest) -> CliprdrResult<()>;

    /// Remote clipboard data arrived
    fn on_format_data_response(&self, response: &FormatDataResponse) -> CliprdrResult<()>;

    /// The remote wants the size or a byte range of a locally copied file
    fn on_file_contents_request(&self, request: &FileContentsRequest) -> CliprdrResult<()>;

    /// A file size or byte range arrived from the remote
    fn on_file_contents_response(&self, response: &FileContentsResponse) -> CliprdrResult<()>;
}
