//! CLIPRDR client
//!
//! [`CliprdrClient`] is the application-facing entry point. It owns the
//! per-connection [`Session`] and hands the transport a [`CliprdrHandler`]
//! that routes inbound messages to the negotiation, exchange and download
//! code.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clipsync_cliprdr::{
    Capabilities, CliprdrHandler, CliprdrResult, FileContentsRequest, FileContentsResponse, FormatDataRequest,
    FormatDataResponse, FormatList, RemoteTransport, ResponseStatus,
};
use clipsync_core::FormatConverter;
use crossbeam_channel::bounded;
use tracing::{debug, info, info_span, Span};

use super::download::{Downloader, Tracker};
use super::error::{ClipSyncError, Result};
use super::negotiation::local_format_list;
use super::session::Session;
use super::ui::{ClipContent, PasteFilesStatus, PasteStatusSink, UiHandle, UiJob};
use crate::config::{ClipboardConfig, TransferConfig};

/// Shared by the client handle, the transport's handler and the worker spawner
pub(crate) struct ClientInner {
    pub(crate) session: Arc<Session>,
    pub(crate) transport: Arc<dyn RemoteTransport>,
    pub(crate) ui: UiHandle,
    pub(crate) status: Arc<dyn PasteStatusSink>,
    pub(crate) converter: FormatConverter,
    pub(crate) sync_timeout: Duration,
    pub(crate) transfer_config: TransferConfig,
    pub(crate) span: Span,
}

impl ClientInner {
    /// Abort and join the active transfer, if any. No lock is held while joining.
    pub(crate) fn abort_transfer_and_wait(&self) {
        if let Some(handle) = self.session.take_transfer() {
            debug!(parent: &self.span, "Aborting file transfer");
            handle.abort_and_join(&self.span);
            self.session.end_file_transfer();
        }
    }
}

/// Clipboard synchronization client for one CLIPRDR connection
pub struct CliprdrClient {
    inner: Arc<ClientInner>,
}

impl CliprdrClient {
    /// Create a client.
    ///
    /// `span` is the parent of every log record the client and its workers emit.
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        ui: UiHandle,
        status: Arc<dyn PasteStatusSink>,
        clipboard_config: &ClipboardConfig,
        transfer_config: &TransferConfig,
        span: Span,
    ) -> Self {
        let inner = ClientInner {
            session: Arc::new(Session::new()),
            transport,
            ui,
            status,
            converter: FormatConverter::with_max_size(clipboard_config.max_size),
            sync_timeout: Duration::from_millis(clipboard_config.sync_timeout_ms),
            transfer_config: transfer_config.clone(),
            span,
        };
        debug!(parent: &inner.span, "Clipboard client created");
        Self { inner: Arc::new(inner) }
    }

    /// Callback table to register with the transport
    pub fn handler(&self) -> Arc<dyn CliprdrHandler> {
        Arc::clone(&self.inner) as Arc<dyn CliprdrHandler>
    }

    /// Session state, for inspection
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Fetch remote clipboard data synchronously.
    ///
    /// Blocks for at most the configured sync timeout. `Ok(None)` means the
    /// remote answered without data. After a timeout the answer is installed
    /// into the local clipboard when it eventually arrives.
    pub fn request_data(&self, format_id: u32) -> Result<Option<ClipContent>> {
        self.inner.request_data(format_id)
    }

    /// Download the files on the remote clipboard into `directory`.
    ///
    /// Replaces a transfer that is already running. Progress is reported
    /// through the status sink; this call returns once the worker is started.
    pub fn paste_files_to_directory(&self, directory: impl AsRef<Path>) -> Result<()> {
        let inner = &self.inner;
        let directory = directory.as_ref();
        if directory.as_os_str().is_empty() {
            return Err(ClipSyncError::InvalidDestination(directory.to_path_buf()));
        }

        inner.session.ensure_no_fetch()?;
        if !inner.session.negotiated_formats().files_available() {
            return Err(ClipSyncError::NoFileData);
        }

        inner.abort_transfer_and_wait();

        let span = info_span!(parent: &inner.span, "download", destination = %directory.display());
        inner.session.start_transfer(|formats| {
            Downloader {
                tracker: Arc::new(Tracker::new(directory.to_path_buf())),
                session: Arc::clone(&inner.session),
                transport: Arc::clone(&inner.transport),
                status: Arc::clone(&inner.status),
                formats,
                config: inner.transfer_config.clone(),
                span,
            }
            .spawn()
        })?;

        info!(parent: &inner.span, destination = %directory.display(), "Paste files started");
        Ok(())
    }

    /// Ask the running transfer to stop. Returns immediately.
    pub fn stop_transfer(&self) {
        if let Some(tracker) = self.inner.session.tracker() {
            info!(parent: &self.inner.span, "Stopping file transfer");
            tracker.request_abort();
        }
    }

    /// The local clipboard changed; announce its targets once the channel is ready
    pub fn on_local_clipboard_changed(&self, targets: &[String]) -> Result<()> {
        if !self.inner.session.is_ready() {
            debug!(parent: &self.inner.span, "Channel not ready, local change not announced");
            return Ok(());
        }
        let list = local_format_list(targets);
        debug!(parent: &self.inner.span, formats = list.formats.len(), "Announcing local formats");
        self.inner.transport.send_format_list(list)?;
        Ok(())
    }

    /// The local clipboard was emptied
    pub fn on_local_clipboard_cleared(&self) {
        self.inner.session.clear_remote_offer();
        self.inner.abort_transfer_and_wait();
        self.inner.status.pastefiles_status(PasteFilesStatus::NoFiles);
    }

    /// Stop owning the local clipboard. The release runs on the UI thread
    /// after this returns.
    pub fn detach_owner(&self) -> Result<()> {
        self.inner.abort_transfer_and_wait();
        let (reply, _) = bounded(1);
        self.inner.ui.post(UiJob::ReleaseOwnership { reply })
    }

    /// Abort and join any transfer. Safe to call more than once.
    pub fn teardown(&self) {
        self.inner.abort_transfer_and_wait();
    }
}

impl Drop for CliprdrClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl CliprdrHandler for ClientInner {
    fn on_monitor_ready(&self) -> CliprdrResult<()> {
        self.handle_monitor_ready()
    }

    fn on_capabilities(&self, capabilities: &Capabilities) -> CliprdrResult<()> {
        self.handle_capabilities(capabilities);
        Ok(())
    }

    fn on_format_list(&self, list: &FormatList) -> CliprdrResult<()> {
        self.handle_format_list(list)
    }

    fn on_format_list_response(&self, status: ResponseStatus) -> CliprdrResult<()> {
        debug!(parent: &self.span, ?status, "Format list response received");
        Ok(())
    }

    fn on_format_data_request(&self, request: &FormatDataRequest) -> CliprdrResult<()> {
        self.handle_format_data_request(request)
    }

    fn on_format_data_response(&self, response: &FormatDataResponse) -> CliprdrResult<()> {
        self.handle_format_data_response(response)
    }

    fn on_file_contents_request(&self, request: &FileContentsRequest) -> CliprdrResult<()> {
        self.handle_file_contents_request(request)
    }

    fn on_file_contents_response(&self, response: &FileContentsResponse) -> CliprdrResult<()> {
        self.handle_file_contents_response(response)
    }
}
