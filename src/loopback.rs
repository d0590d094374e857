//! In-process CLIPRDR peer
//!
//! [`LoopbackTransport`] queues everything the client sends. A
//! [`LoopbackPeer`] thread drains that queue, plays the remote side against
//! the client's [`CliprdrHandler`] and serves a local directory as the remote
//! clipboard's file list. [`MemoryClipboard`] stands in for the desktop
//! clipboard on the UI thread.
//!
//! The binary uses these to drive a full copy/paste session without an RDP
//! connection; the integration tests use them as the remote end.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use clipsync_cliprdr::{
    Capabilities, CapabilitySet, CliprdrError, CliprdrHandler, CliprdrResult, FileContentsFlag, FileContentsRequest,
    FileContentsResponse, FormatDataRequest, FormatDataResponse, FormatList, GeneralCapabilityFlag,
    RemoteTransport, ResponseStatus,
};
use clipsync_cliprdr::pdu::CB_CAPS_VERSION_2;
use clipsync_core::{
    ClipboardFormat, FileDescriptor, FormatConverter, LocalType, CF_UNICODETEXT, FORMAT_NAME_FILE_CONTENTS,
    FORMAT_NAME_FILE_GROUP_DESCRIPTOR, FORMAT_NAME_PREFERRED_DROP_EFFECT,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::DynamicImage;
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::{debug, trace, warn, Span};

use crate::clipboard::{ClipContent, LocalClipboard, RemoteTarget};

/// Format id the peer announces for "FileGroupDescriptorW"
pub const PEER_FILE_GROUP_DESCRIPTOR_ID: u32 = 0xC0A1;
/// Format id the peer announces for "FileContents"
pub const PEER_FILE_CONTENTS_ID: u32 = 0xC0A2;
/// Format id the peer announces for "Preferred DropEffect"
pub const PEER_DROP_EFFECT_ID: u32 = 0xC0A3;

const DROPEFFECT_COPY: u32 = 1;

// =============================================================================
// Transport
// =============================================================================

/// A message the client sent to the remote
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Client capabilities
    Capabilities(Capabilities),
    /// Local format list
    FormatList(FormatList),
    /// Acknowledgement of a remote format list
    FormatListResponse(ResponseStatus),
    /// Request for remote clipboard data
    FormatDataRequest(FormatDataRequest),
    /// Answer to a remote data request
    FormatDataResponse(FormatDataResponse),
    /// Request for a remote file size or range
    FileContentsRequest(FileContentsRequest),
    /// Answer to a remote file contents request
    FileContentsResponse(FileContentsResponse),
    /// Stop the peer
    Shutdown,
}

/// [`RemoteTransport`] that queues messages for a [`LoopbackPeer`]
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    tx: Sender<Outbound>,
}

impl LoopbackTransport {
    /// Create the transport and the queue the peer drains
    pub fn channel() -> (Self, Receiver<Outbound>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Ask the peer thread to exit
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Shutdown);
    }

    fn push(&self, message: Outbound) -> CliprdrResult<()> {
        self.tx.send(message).map_err(|_| CliprdrError::ChannelClosed)
    }
}

impl RemoteTransport for LoopbackTransport {
    fn send_capabilities(&self, capabilities: Capabilities) -> CliprdrResult<()> {
        self.push(Outbound::Capabilities(capabilities))
    }

    fn send_format_list(&self, list: FormatList) -> CliprdrResult<()> {
        self.push(Outbound::FormatList(list))
    }

    fn send_format_list_response(&self, status: ResponseStatus) -> CliprdrResult<()> {
        self.push(Outbound::FormatListResponse(status))
    }

    fn send_format_data_request(&self, request: FormatDataRequest) -> CliprdrResult<()> {
        self.push(Outbound::FormatDataRequest(request))
    }

    fn send_format_data_response(&self, response: FormatDataResponse) -> CliprdrResult<()> {
        self.push(Outbound::FormatDataResponse(response))
    }

    fn send_file_contents_request(&self, request: FileContentsRequest) -> CliprdrResult<()> {
        self.push(Outbound::FileContentsRequest(request))
    }

    fn send_file_contents_response(&self, response: FileContentsResponse) -> CliprdrResult<()> {
        self.push(Outbound::FileContentsResponse(response))
    }
}

// =============================================================================
// Remote files
// =============================================================================

#[derive(Debug, Clone)]
struct RemoteFile {
    descriptor: FileDescriptor,
    path: PathBuf,
}

/// A directory tree exposed as the remote clipboard's file list
#[derive(Debug, Clone, Default)]
pub struct RemoteFiles {
    entries: Vec<RemoteFile>,
}

impl RemoteFiles {
    /// Walk `root` and describe every entry below it with a `\` separated
    /// relative name. Directories precede their contents.
    pub fn scan(root: &Path) -> io::Result<Self> {
        let mut files = Self::default();
        files.scan_dir(root, "")?;
        Ok(files)
    }

    fn scan_dir(&mut self, dir: &Path, prefix: &str) -> io::Result<()> {
        let mut children: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            let Some(name) = child.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}\\{}", prefix, name)
            };
            let metadata = child.metadata()?;
            let path = child.path();

            self.entries.push(RemoteFile {
                descriptor: FileDescriptor {
                    flags: FileDescriptor::FLAG_ATTRIBUTES | FileDescriptor::FLAG_FILESIZE,
                    attributes: if metadata.is_dir() { 0x10 } else { 0x80 },
                    write_time: None,
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    name: relative.clone(),
                },
                path: path.clone(),
            });

            if metadata.is_dir() {
                self.scan_dir(&path, &relative)?;
            }
        }
        Ok(())
    }

    /// Number of entries, directories included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all file sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|entry| entry.descriptor.size).sum()
    }

    fn descriptor_list(&self) -> Vec<u8> {
        let descriptors: Vec<FileDescriptor> = self.entries.iter().map(|entry| entry.descriptor.clone()).collect();
        FileDescriptor::encode_list(&descriptors).unwrap_or_default()
    }

    fn read(&self, request: &FileContentsRequest) -> io::Result<FileContentsResponse> {
        let entry = self
            .entries
            .get(request.list_index as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such list index"))?;

        if request.flags.contains(FileContentsFlag::Size) {
            return Ok(FileContentsResponse::with_size(request.stream_id, entry.descriptor.size));
        }

        let mut file = File::open(&entry.path)?;
        file.seek(SeekFrom::Start(request.position))?;
        let mut data = Vec::with_capacity(request.requested as usize);
        file.take(u64::from(request.requested)).read_to_end(&mut data)?;
        Ok(FileContentsResponse::with_range(request.stream_id, data))
    }
}

// =============================================================================
// Peer
// =============================================================================

/// What the peer observed from the client
#[derive(Debug, Default)]
pub struct PeerRecord {
    /// Capabilities the client announced
    pub capabilities: Vec<Capabilities>,
    /// Format lists the client announced
    pub format_lists: Vec<FormatList>,
    /// The client's answers to our format lists
    pub format_list_responses: Vec<ResponseStatus>,
    /// Data requests the client sent
    pub data_requests: Vec<FormatDataRequest>,
    /// File contents requests the client sent
    pub file_requests: Vec<FileContentsRequest>,
}

/// Shared view of a [`PeerRecord`]
#[derive(Debug, Clone, Default)]
pub struct PeerLog {
    record: Arc<Mutex<PeerRecord>>,
}

impl PeerLog {
    /// Run `f` against the record
    pub fn inspect<R>(&self, f: impl FnOnce(&PeerRecord) -> R) -> R {
        f(&self.record.lock())
    }

    /// Lengths of the RANGE requests, in order
    pub fn range_lengths(&self) -> Vec<u32> {
        self.inspect(|record| {
            record
                .file_requests
                .iter()
                .filter(|request| request.flags.contains(FileContentsFlag::Range))
                .map(|request| request.requested)
                .collect()
        })
    }

    fn update(&self, f: impl FnOnce(&mut PeerRecord)) {
        f(&mut self.record.lock());
    }
}

/// A wrong answer the peer gives for one file of its list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFault {
    /// SIZE answers carry 4 bytes instead of 8
    ShortSize,
    /// RANGE answers carry one byte more than requested
    OversizedRange,
}

/// Simulated remote end of a clipboard channel
#[derive(Debug, Default)]
pub struct LoopbackPeer {
    files: RemoteFiles,
    text: Option<String>,
    range_delay: Duration,
    faults: Vec<(u32, FileFault)>,
    log: PeerLog,
    converter: FormatConverter,
}

impl LoopbackPeer {
    /// A peer with an empty clipboard
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer these files on the remote clipboard
    pub fn with_files(mut self, files: RemoteFiles) -> Self {
        self.files = files;
        self
    }

    /// Offer this text on the remote clipboard
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sleep before answering each RANGE request
    pub fn with_range_delay(mut self, delay: Duration) -> Self {
        self.range_delay = delay;
        self
    }

    /// Misanswer file contents requests for list entry `index`
    pub fn with_fault(mut self, index: u32, fault: FileFault) -> Self {
        self.faults.push((index, fault));
        self
    }

    /// Record of what the client sent
    pub fn log(&self) -> PeerLog {
        self.log.clone()
    }

    /// The format list this peer announces
    pub fn format_list(&self) -> FormatList {
        let mut formats = Vec::new();
        if self.text.is_some() {
            formats.push(ClipboardFormat::new(CF_UNICODETEXT));
        }
        if !self.files.is_empty() {
            formats.push(ClipboardFormat::with_name(
                PEER_FILE_GROUP_DESCRIPTOR_ID,
                FORMAT_NAME_FILE_GROUP_DESCRIPTOR,
            ));
            formats.push(ClipboardFormat::with_name(PEER_FILE_CONTENTS_ID, FORMAT_NAME_FILE_CONTENTS));
            formats.push(ClipboardFormat::with_name(
                PEER_DROP_EFFECT_ID,
                FORMAT_NAME_PREFERRED_DROP_EFFECT,
            ));
        }
        FormatList::new(formats)
    }

    /// Run the peer on its own thread.
    ///
    /// The thread plays the connection sequence (monitor ready, server
    /// capabilities, server format list) and then answers the client's
    /// requests until [`LoopbackTransport::close`] is called.
    pub fn spawn(
        self,
        handler: Arc<dyn CliprdrHandler>,
        inbox: Receiver<Outbound>,
        span: Span,
    ) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("clipsync-peer".to_string())
            .spawn(move || self.run(handler.as_ref(), inbox, &span))
    }

    fn run(self, handler: &dyn CliprdrHandler, inbox: Receiver<Outbound>, span: &Span) {
        let report = |what: &str, result: CliprdrResult<()>| {
            if let Err(err) = result {
                debug!(parent: span, error = %err, "{} callback failed", what);
            }
        };

        report("monitor ready", handler.on_monitor_ready());
        report("capabilities", handler.on_capabilities(&server_capabilities()));
        report("format list", handler.on_format_list(&self.format_list()));

        for message in inbox {
            trace!(parent: span, ?message, "Peer received");
            match message {
                Outbound::Capabilities(capabilities) => {
                    self.log.update(|record| record.capabilities.push(capabilities));
                }
                Outbound::FormatList(list) => {
                    self.log.update(|record| record.format_lists.push(list));
                    report("format list response", handler.on_format_list_response(ResponseStatus::Ok));
                }
                Outbound::FormatListResponse(status) => {
                    self.log.update(|record| record.format_list_responses.push(status));
                }
                Outbound::FormatDataRequest(request) => {
                    self.log.update(|record| record.data_requests.push(request));
                    let response = self.answer_format_data(&request);
                    report("format data response", handler.on_format_data_response(&response));
                }
                Outbound::FileContentsRequest(request) => {
                    self.log.update(|record| record.file_requests.push(request));
                    if request.flags.contains(FileContentsFlag::Range) && !self.range_delay.is_zero() {
                        std::thread::sleep(self.range_delay);
                    }
                    let response = self.files.read(&request).unwrap_or_else(|err| {
                        warn!(parent: span, index = request.list_index, error = %err, "Peer cannot read file");
                        FileContentsResponse::fail(request.stream_id)
                    });
                    let response = self.apply_fault(&request, response);
                    report("file contents response", handler.on_file_contents_response(&response));
                }
                Outbound::FormatDataResponse(_) | Outbound::FileContentsResponse(_) => {}
                Outbound::Shutdown => break,
            }
        }
        debug!(parent: span, "Peer stopped");
    }

    fn apply_fault(&self, request: &FileContentsRequest, mut response: FileContentsResponse) -> FileContentsResponse {
        if response.status != ResponseStatus::Ok {
            return response;
        }
        let fault = self
            .faults
            .iter()
            .find(|(index, _)| *index == request.list_index)
            .map(|(_, fault)| *fault);
        match fault {
            Some(FileFault::ShortSize) if request.flags.contains(FileContentsFlag::Size) => {
                response.data = response.data.slice(..response.data.len().min(4));
            }
            Some(FileFault::OversizedRange) if request.flags.contains(FileContentsFlag::Range) => {
                let mut data = response.data.to_vec();
                data.push(0);
                response.data = data.into();
            }
            _ => {}
        }
        response
    }

    fn answer_format_data(&self, request: &FormatDataRequest) -> FormatDataResponse {
        match request.format_id {
            CF_UNICODETEXT => match self.text.as_deref().map(|text| self.converter.encode_text(CF_UNICODETEXT, text)) {
                Some(Ok(data)) => FormatDataResponse::ok(data),
                _ => FormatDataResponse::fail(),
            },
            PEER_FILE_GROUP_DESCRIPTOR_ID if !self.files.is_empty() => {
                FormatDataResponse::ok(self.files.descriptor_list())
            }
            PEER_DROP_EFFECT_ID => FormatDataResponse::ok(DROPEFFECT_COPY.to_le_bytes().to_vec()),
            _ => FormatDataResponse::fail(),
        }
    }
}

/// Capabilities a Windows server typically announces
pub fn server_capabilities() -> Capabilities {
    Capabilities {
        sets: vec![CapabilitySet::General {
            version: CB_CAPS_VERSION_2,
            flags: GeneralCapabilityFlag::UseLongFormatNames | GeneralCapabilityFlag::StreamFileclipEnabled,
        }],
    }
}

// =============================================================================
// Clipboard
// =============================================================================

/// Contents and ownership of a [`MemoryClipboard`]
#[derive(Debug, Default)]
pub struct MemoryState {
    /// Local targets on offer
    pub targets: Vec<String>,
    /// Plain text behind the text targets
    pub text: Option<String>,
    /// Markup behind `text/html`
    pub html: Option<String>,
    /// `text/uri-list` payload
    pub uri_list: Option<String>,
    /// Image behind the image targets
    pub image: Option<DynamicImage>,
    /// Remote targets installed by the last remote format list
    pub offered: Vec<RemoteTarget>,
    /// Last content installed from the remote
    pub content: Option<ClipContent>,
    /// True while the remote owns the clipboard
    pub remote_owned: bool,
}

/// Clipboard held in memory, shareable between the UI thread and observers
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryClipboard {
    /// An empty clipboard
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a local text copy
    pub fn copy_text(&self, text: impl Into<String>) {
        let mut state = self.state.lock();
        *state = MemoryState {
            targets: [LocalType::Utf8Text, LocalType::Text]
                .iter()
                .map(|local| local.target_name().to_string())
                .collect(),
            text: Some(text.into()),
            ..MemoryState::default()
        };
    }

    /// Simulate copying local files
    pub fn copy_files(&self, paths: &[PathBuf]) {
        let list: String = paths.iter().map(|path| format!("{}\r\n", file_uri(path))).collect();
        let mut state = self.state.lock();
        *state = MemoryState {
            targets: vec![LocalType::UriList.target_name().to_string()],
            uri_list: Some(list),
            ..MemoryState::default()
        };
    }

    /// Simulate a local image copy
    pub fn copy_image(&self, image: DynamicImage) {
        let mut state = self.state.lock();
        *state = MemoryState {
            targets: vec![LocalType::Png.target_name().to_string()],
            image: Some(image),
            ..MemoryState::default()
        };
    }

    /// Run `f` against the current state
    pub fn inspect<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        f(&self.state.lock())
    }
}

impl LocalClipboard for MemoryClipboard {
    fn targets(&self) -> Vec<String> {
        self.state.lock().targets.clone()
    }

    fn read_text(&self, kind: LocalType) -> Option<String> {
        let state = self.state.lock();
        match kind {
            LocalType::Utf8Text | LocalType::Text => state.text.clone(),
            LocalType::Html => state.html.clone(),
            LocalType::UriList => state.uri_list.clone(),
            _ => None,
        }
    }

    fn read_image(&self) -> Option<DynamicImage> {
        self.state.lock().image.clone()
    }

    fn offer_remote_targets(&mut self, targets: &[RemoteTarget]) {
        let mut state = self.state.lock();
        state.targets = targets.iter().map(|target| target.target_name().to_string()).collect();
        state.offered = targets.to_vec();
        state.remote_owned = true;
    }

    fn set_content(&mut self, content: ClipContent) {
        self.state.lock().content = Some(content);
    }

    fn release_ownership(&mut self) {
        let mut state = self.state.lock();
        state.remote_owned = false;
        state.offered.clear();
    }
}

// spaces and percent signs must not reach the URI list raw
const URI_PATH: &AsciiSet = &CONTROLS.add(b' ').add(b'%').add(b'#').add(b'?');

fn file_uri(path: &Path) -> String {
    format!("file://{}", utf8_percent_encode(&path.to_string_lossy(), URI_PATH))
}
