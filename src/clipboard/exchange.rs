//! Format data and file contents exchange.
//!
//! Outbound: answer remote requests from the local clipboard and from the
//! files it lists. Inbound: synchronous fetches and routing of the answers
//! the remote sends back.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use clipsync_cliprdr::{
    CliprdrError, CliprdrResult, FileContentsFlag, FileContentsRequest, FileContentsResponse, FormatDataRequest,
    FormatDataResponse, ResponseStatus,
};
use clipsync_core::image::{decode_image, encode_image};
use clipsync_core::{local_type_for_remote, parse_uri_list, FileDescriptor, LocalType};
use tracing::{debug, info, trace, warn};

use super::client::ClientInner;
use super::error::{ClipSyncError, Result};
use super::session::{FetchCompletion, PendingFetch};
use super::ui::{ClipContent, UiJob};

impl ClientInner {
    // =========================================================================
    // Outbound: local clipboard to remote
    // =========================================================================

    pub(crate) fn handle_format_data_request(&self, request: &FormatDataRequest) -> CliprdrResult<()> {
        debug!(parent: &self.span, format_id = request.format_id, "Format data request received");

        let response = match self.collect_local_data(request.format_id) {
            Ok(Some(data)) => {
                debug!(parent: &self.span, bytes = data.len(), "Sending format data");
                FormatDataResponse::ok(data)
            }
            Ok(None) => {
                debug!(parent: &self.span, format_id = request.format_id, "No local data for format");
                FormatDataResponse::fail()
            }
            Err(err) => {
                warn!(parent: &self.span, format_id = request.format_id, error = %err, "Failed to collect local data");
                FormatDataResponse::fail()
            }
        };
        self.transport.send_format_data_response(response)
    }

    fn collect_local_data(&self, format_id: u32) -> Result<Option<Vec<u8>>> {
        let Some(format) = local_type_for_remote(format_id) else {
            return Ok(None);
        };
        let Some(content) = self.ui.call(|reply| UiJob::CollectData { format, reply })? else {
            return Ok(None);
        };

        let data = match (format, content) {
            (LocalType::UriList, ClipContent::Text(list)) => self.serve_uri_list(&list)?,
            (format, ClipContent::Text(text)) if format.is_text() => self.converter.encode_text(format_id, &text)?,
            (format, ClipContent::Image(image)) if format.is_image() => encode_image(format, &image)?,
            _ => return Ok(None),
        };
        Ok(Some(data))
    }

    /// Turn a local URI list into a FileGroupDescriptorW payload and remember
    /// the paths for the file contents requests that follow
    fn serve_uri_list(&self, list: &str) -> Result<Vec<u8>> {
        let paths = parse_uri_list(list);
        let data = FileDescriptor::build_list(&paths)?;
        info!(parent: &self.span, files = paths.len(), "Offering local files");
        self.session.set_served_files(paths);
        Ok(data)
    }

    pub(crate) fn handle_file_contents_request(&self, request: &FileContentsRequest) -> CliprdrResult<()> {
        trace!(
            parent: &self.span,
            index = request.list_index,
            flags = request.flags.bits(),
            position = request.position,
            requested = request.requested,
            "File contents request received"
        );

        let response = match self.read_served_file(request) {
            Ok(response) => response,
            Err(err) => {
                warn!(parent: &self.span, index = request.list_index, error = %err, "File contents request failed");
                FileContentsResponse::fail(request.stream_id)
            }
        };
        self.transport.send_file_contents_response(response)
    }

    fn read_served_file(&self, request: &FileContentsRequest) -> Result<FileContentsResponse> {
        let flags = request.flags;
        if flags.contains(FileContentsFlag::Size | FileContentsFlag::Range) || flags.is_empty() {
            return Err(CliprdrError::InvalidFlags(flags.bits()).into());
        }

        let path = self
            .session
            .served_file(request.list_index)
            .ok_or(ClipSyncError::UnknownFile(request.list_index))?;

        if flags.contains(FileContentsFlag::Size) {
            if request.requested != 8 {
                debug!(parent: &self.span, requested = request.requested, "SIZE request with unusual length");
            }
            let size = std::fs::metadata(&path)?.len();
            return Ok(FileContentsResponse::with_size(request.stream_id, size));
        }

        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(request.position))?;
        let mut data = Vec::with_capacity(request.requested as usize);
        file.take(u64::from(request.requested)).read_to_end(&mut data)?;
        Ok(FileContentsResponse::with_range(request.stream_id, data))
    }

    // =========================================================================
    // Inbound: remote clipboard to local
    // =========================================================================

    pub(crate) fn request_data(&self, format_id: u32) -> Result<Option<ClipContent>> {
        self.session.begin_sync_fetch(format_id)?;

        if let Err(err) = self.transport.send_format_data_request(FormatDataRequest { format_id }) {
            self.session.abandon_sync_fetch();
            return Err(err.into());
        }

        match self.session.wait_for_fetch(self.sync_timeout) {
            Some(content) => Ok(content),
            None => {
                info!(
                    parent: &self.span,
                    format_id,
                    "Clipboard data not transferred within {:.1}s, try again",
                    self.sync_timeout.as_secs_f32()
                );
                Err(ClipSyncError::Timeout(self.sync_timeout))
            }
        }
    }

    pub(crate) fn handle_format_data_response(&self, response: &FormatDataResponse) -> CliprdrResult<()> {
        match self.session.pending() {
            PendingFetch::FileTransferActive => self.deliver_format_data(response),
            PendingFetch::SyncWait | PendingFetch::AsyncWait => {
                let content = self
                    .session
                    .requested_format()
                    .and_then(|format_id| self.decode_remote_data(format_id, response));

                match self.session.complete_fetch(content) {
                    FetchCompletion::Delivered | FetchCompletion::Install(None) => Ok(()),
                    FetchCompletion::Install(Some(content)) => {
                        debug!(parent: &self.span, "Installing late clipboard data");
                        self.ui
                            .call(|reply| UiJob::SetContent { content, reply })
                            .map_err(|err| CliprdrError::Rejected(err.to_string()))
                    }
                    FetchCompletion::Dropped => {
                        debug!(parent: &self.span, "Dropping format data response, nothing pending");
                        Ok(())
                    }
                }
            }
            PendingFetch::None => {
                debug!(parent: &self.span, "Dropping unsolicited format data response");
                Ok(())
            }
        }
    }

    fn decode_remote_data(&self, format_id: u32, response: &FormatDataResponse) -> Option<ClipContent> {
        if !response.has_data() {
            return None;
        }
        let local = self.session.local_type_of(format_id)?;

        let decoded = if local.is_image() {
            decode_image(local, &response.data).map(ClipContent::Image)
        } else {
            // dynamically numbered text formats decode like their static id
            let wire_format = local.remote_format().unwrap_or(format_id);
            self.converter
                .decode_text(wire_format, &response.data)
                .map(ClipContent::Text)
        };

        match decoded {
            Ok(content) => Some(content),
            Err(err) => {
                warn!(parent: &self.span, format_id, error = %err, "Failed to decode remote clipboard data");
                None
            }
        }
    }

    fn deliver_format_data(&self, response: &FormatDataResponse) -> CliprdrResult<()> {
        let Some(tracker) = self.session.tracker() else {
            debug!(parent: &self.span, "No transfer to receive format data");
            return Ok(());
        };
        match tracker.deliver_format_data(response) {
            Some(ResponseStatus::Ok) => Ok(()),
            Some(ResponseStatus::Fail) => Err(CliprdrError::Rejected("format data not accepted".to_string())),
            None => {
                debug!(parent: &self.span, "Format data response not awaited by transfer");
                Ok(())
            }
        }
    }

    pub(crate) fn handle_file_contents_response(&self, response: &FileContentsResponse) -> CliprdrResult<()> {
        let Some(tracker) = self.session.tracker() else {
            debug!(parent: &self.span, "Dropping file contents response, no transfer");
            return Ok(());
        };
        match tracker.deliver_file_contents(response) {
            Some(ResponseStatus::Ok) => Ok(()),
            Some(ResponseStatus::Fail) => Err(CliprdrError::Rejected("file contents not accepted".to_string())),
            None => Err(CliprdrError::Unexpected("file contents response")),
        }
    }
}
