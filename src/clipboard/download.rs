//! Bulk file download from the remote clipboard.
//!
//! A [`Downloader`] runs on its own thread. It asks the remote for the drop
//! effect and the file descriptor list, then pulls each file with SIZE and
//! RANGE requests into a `.part` staging file that is renamed on success.
//!
//! Responses reach the worker through the session's [`Tracker`]: the
//! transport thread claims the exchange the worker announced, hands the
//! payload over and blocks until the worker releases it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clipsync_cliprdr::{
    FileContentsRequest, FileContentsResponse, FormatDataRequest, FormatDataResponse, RemoteTransport,
    ResponseStatus,
};
use clipsync_core::{DropEffect, FileDescriptor};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn, Span};

use super::error::ClipSyncError;
use super::rendezvous::{Interrupted, Lease, Rendezvous};
use super::session::{FileFormats, Session};
use super::ui::{PasteFilesStatus, PasteStatusSink};
use crate::config::TransferConfig;

// each transfer tags its file contents requests with its own stream id
static NEXT_STREAM_ID: AtomicU32 = AtomicU32::new(1);

// =============================================================================
// Tracker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    FormatData,
    FileContents,
}

#[derive(Debug)]
struct TrackerControl {
    abort_requested: bool,
    awaiting: Option<Exchange>,
    // dropping the sender wakes an idle wait
    cancel: Option<Sender<()>>,
}

/// Shared state of one bulk transfer
#[derive(Debug)]
pub(crate) struct Tracker {
    destination: PathBuf,
    stream_id: u32,
    control: Mutex<TrackerControl>,
    cancelled: Receiver<()>,
    format_data: Rendezvous<FormatDataResponse>,
    file_contents: Rendezvous<FileContentsResponse>,
}

impl Tracker {
    pub(crate) fn new(destination: PathBuf) -> Self {
        let (cancel, cancelled) = bounded(0);
        Self {
            destination,
            stream_id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            control: Mutex::new(TrackerControl {
                abort_requested: false,
                awaiting: None,
                cancel: Some(cancel),
            }),
            cancelled,
            format_data: Rendezvous::new(),
            file_contents: Rendezvous::new(),
        }
    }

    pub(crate) fn destination(&self) -> &Path {
        &self.destination
    }

    /// Ask the worker to stop and wake it if it is waiting for a response
    pub(crate) fn request_abort(&self) {
        let mut control = self.control.lock();
        control.abort_requested = true;
        control.cancel.take();
    }

    pub(crate) fn abort_requested(&self) -> bool {
        self.control.lock().abort_requested
    }

    fn expect(&self, exchange: Exchange) -> Result<(), TransferStop> {
        let mut control = self.control.lock();
        if control.abort_requested {
            return Err(TransferStop::Aborted);
        }
        control.awaiting = Some(exchange);
        Ok(())
    }

    /// Returns false if the transport already claimed the exchange
    fn withdraw(&self) -> bool {
        self.control.lock().awaiting.take().is_some()
    }

    fn claim(&self, exchange: Exchange) -> bool {
        let mut control = self.control.lock();
        if control.awaiting == Some(exchange) {
            control.awaiting = None;
            true
        } else {
            false
        }
    }

    /// Transport side. `None` means the worker was not waiting for this response.
    pub(crate) fn deliver_format_data(&self, response: &FormatDataResponse) -> Option<ResponseStatus> {
        self.claim(Exchange::FormatData)
            .then(|| self.format_data.deliver(response.clone()))
    }

    /// Transport side. `None` means the worker was not waiting for this response.
    pub(crate) fn deliver_file_contents(&self, response: &FileContentsResponse) -> Option<ResponseStatus> {
        if response.stream_id != self.stream_id {
            return None;
        }
        self.claim(Exchange::FileContents)
            .then(|| self.file_contents.deliver(response.clone()))
    }

    fn await_response<'a, T>(&'a self, rendezvous: &'a Rendezvous<T>) -> Result<Lease<'a, T>, TransferStop> {
        match rendezvous.wait(&self.cancelled) {
            Ok(lease) => Ok(lease),
            Err(Interrupted::Cancelled) => {
                if !self.withdraw() {
                    // the transport is about to deliver; unblock it before leaving
                    if let Some(lease) = rendezvous.wait_claimed() {
                        lease.release(ResponseStatus::Fail);
                    }
                }
                Err(TransferStop::Aborted)
            }
        }
    }
}

/// Owned handle of a running worker
#[derive(Debug)]
pub(crate) struct TransferHandle {
    tracker: Arc<Tracker>,
    thread: JoinHandle<()>,
}

impl TransferHandle {
    pub(crate) fn tracker(&self) -> Arc<Tracker> {
        Arc::clone(&self.tracker)
    }

    pub(crate) fn owns(&self, tracker: &Arc<Tracker>) -> bool {
        Arc::ptr_eq(&self.tracker, tracker)
    }

    /// Stop the worker and wait for it to exit
    pub(crate) fn abort_and_join(self, span: &Span) {
        self.tracker.request_abort();
        if self.thread.join().is_err() {
            warn!(parent: span, "Download worker panicked");
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

#[derive(Debug, Error)]
enum TransferStop {
    #[error("aborted")]
    Aborted,
    #[error(transparent)]
    Failed(#[from] ClipSyncError),
}

enum FileOutcome {
    Completed(u64),
    Skipped(String),
}

#[derive(Debug, Default)]
struct Summary {
    completed: usize,
    skipped: usize,
    bytes: u64,
}

/// Chunk sizing and progress accounting across the whole batch
#[derive(Debug)]
struct Progress {
    total: u64,
    transferred: u64,
    chunk: u32,
    max_chunk: u32,
    fast_round_trip: Duration,
}

impl Progress {
    fn new(total: u64, config: &TransferConfig) -> Self {
        Self {
            total,
            transferred: 0,
            chunk: config.initial_chunk_size,
            max_chunk: config.max_chunk_size,
            fast_round_trip: Duration::from_millis(config.fast_round_trip_ms),
        }
    }

    fn next_block(&self, remaining: u64) -> u32 {
        remaining.min(u64::from(self.chunk)) as u32
    }

    /// Account for one RANGE answer; a fast round trip doubles the chunk
    fn record(&mut self, received: u64, round_trip: Duration) {
        self.transferred = self.transferred.saturating_add(received);
        if round_trip < self.fast_round_trip {
            if let Some(doubled) = self.chunk.checked_mul(2).filter(|&c| c <= self.max_chunk) {
                self.chunk = doubled;
            }
        }
    }

    fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (u128::from(self.transferred) * 100 / u128::from(self.total)).min(100) as u8
    }
}

/// Everything a download worker needs, moved onto its thread
pub(crate) struct Downloader {
    pub(crate) tracker: Arc<Tracker>,
    pub(crate) session: Arc<Session>,
    pub(crate) transport: Arc<dyn RemoteTransport>,
    pub(crate) status: Arc<dyn PasteStatusSink>,
    pub(crate) formats: FileFormats,
    pub(crate) config: TransferConfig,
    pub(crate) span: Span,
}

impl Downloader {
    /// Start the worker thread
    pub(crate) fn spawn(self) -> Result<TransferHandle, ClipSyncError> {
        let tracker = Arc::clone(&self.tracker);
        let thread = std::thread::Builder::new()
            .name("clipsync-download".to_string())
            .spawn(move || self.run())?;
        Ok(TransferHandle { tracker, thread })
    }

    fn run(self) {
        let started = Instant::now();
        self.status.pastefiles_status(PasteFilesStatus::Progress(0));

        match self.transfer_all() {
            Ok(summary) => info!(
                parent: &self.span,
                completed = summary.completed,
                skipped = summary.skipped,
                bytes = summary.bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "File transfer finished"
            ),
            Err(TransferStop::Aborted) => info!(parent: &self.span, "File transfer aborted"),
            Err(TransferStop::Failed(err)) => warn!(parent: &self.span, error = %err, "File transfer failed"),
        }

        self.session.release_transfer(&self.tracker);
        self.status.pastefiles_status(PasteFilesStatus::Ready);
    }

    fn transfer_all(&self) -> Result<Summary, TransferStop> {
        let drop_effect = {
            let lease = self.request_format_data(self.formats.drop_effect)?;
            let effect = DropEffect::from_payload(&lease.data);
            lease.release(ResponseStatus::Ok);
            effect
        };
        debug!(parent: &self.span, ?drop_effect, "Remote drop effect");

        let descriptors = {
            let lease = self.request_format_data(self.formats.descriptor)?;
            let parsed = FileDescriptor::parse_list(&lease.data);
            lease.release(if parsed.is_ok() {
                ResponseStatus::Ok
            } else {
                ResponseStatus::Fail
            });
            parsed.map_err(ClipSyncError::from)?
        };

        let total = descriptors
            .iter()
            .fold(0u64, |sum, descriptor| sum.saturating_add(descriptor.size));
        info!(
            parent: &self.span,
            files = descriptors.len(),
            total_bytes = total,
            destination = %self.tracker.destination().display(),
            "Starting file transfer"
        );

        let mut progress = Progress::new(total, &self.config);
        let mut summary = Summary::default();

        for (index, descriptor) in descriptors.iter().enumerate() {
            if descriptor.is_directory() {
                continue;
            }
            match self.transfer_file(index as u32, descriptor, &mut progress)? {
                FileOutcome::Completed(bytes) => {
                    summary.completed += 1;
                    summary.bytes += bytes;
                }
                FileOutcome::Skipped(reason) => {
                    warn!(parent: &self.span, file = %descriptor.name, %reason, "Skipping file");
                    summary.skipped += 1;
                }
            }
        }

        Ok(summary)
    }

    fn transfer_file(
        &self,
        index: u32,
        descriptor: &FileDescriptor,
        progress: &mut Progress,
    ) -> Result<FileOutcome, TransferStop> {
        let size = {
            let lease = self.request_file_contents(FileContentsRequest::size(self.tracker.stream_id, index))?;
            let size = lease.size_value();
            lease.release(ResponseStatus::Ok);
            match size {
                Some(size) => size,
                None => return Ok(FileOutcome::Skipped("size answer was not 8 bytes".to_string())),
            }
        };

        let (destination, staging) =
            match staging_paths(self.tracker.destination(), &descriptor.name, &self.config.part_suffix) {
                Ok(paths) => paths,
                Err(err) => return Ok(FileOutcome::Skipped(err.to_string())),
            };

        let _ = fs::remove_file(&staging);
        let file = match OpenOptions::new().write(true).create_new(true).open(&staging) {
            Ok(file) => file,
            Err(err) => return Ok(FileOutcome::Skipped(format!("cannot create {}: {}", staging.display(), err))),
        };
        let mut out = BufWriter::new(file);

        debug!(parent: &self.span, file = %descriptor.name, size, "Receiving file");

        let mut position = 0u64;
        while position < size {
            if self.tracker.abort_requested() {
                discard(out, &staging);
                return Err(TransferStop::Aborted);
            }

            let block = progress.next_block(size - position);
            let request = FileContentsRequest::range(self.tracker.stream_id, index, position, block);
            let started = Instant::now();
            let lease = match self.request_file_contents(request) {
                Ok(lease) => lease,
                Err(stop) => {
                    discard(out, &staging);
                    return Err(stop);
                }
            };

            if lease.status != ResponseStatus::Ok || lease.data.is_empty() {
                lease.release(ResponseStatus::Fail);
                discard(out, &staging);
                return Err(ClipSyncError::TransferFailed(format!(
                    "remote granted no data for {} at offset {}",
                    descriptor.name, position
                ))
                .into());
            }

            let received = lease.data.len() as u64;
            progress.record(received, started.elapsed());
            let written = out.write_all(&lease.data);
            lease.release(if written.is_ok() {
                ResponseStatus::Ok
            } else {
                ResponseStatus::Fail
            });

            if let Err(err) = written {
                warn!(parent: &self.span, file = %descriptor.name, error = %err, "Write failed");
                break;
            }

            position += received;
            self.status.pastefiles_status(PasteFilesStatus::Progress(progress.percent()));
        }

        match finish_file(out, &staging, &destination, size) {
            Ok(()) => Ok(FileOutcome::Completed(size)),
            Err(err) => Ok(FileOutcome::Skipped(format!(
                "{} kept: {}",
                staging.display(),
                err
            ))),
        }
    }

    fn request_format_data(&self, format_id: u32) -> Result<Lease<'_, FormatDataResponse>, TransferStop> {
        self.tracker.expect(Exchange::FormatData)?;
        if let Err(err) = self.transport.send_format_data_request(FormatDataRequest { format_id }) {
            self.tracker.withdraw();
            return Err(ClipSyncError::from(err).into());
        }
        self.tracker.await_response(&self.tracker.format_data)
    }

    fn request_file_contents(
        &self,
        request: FileContentsRequest,
    ) -> Result<Lease<'_, FileContentsResponse>, TransferStop> {
        self.tracker.expect(Exchange::FileContents)?;
        if let Err(err) = self.transport.send_file_contents_request(request) {
            self.tracker.withdraw();
            return Err(ClipSyncError::from(err).into());
        }
        self.tracker.await_response(&self.tracker.file_contents)
    }
}

fn discard(out: BufWriter<File>, staging: &Path) {
    drop(out);
    let _ = fs::remove_file(staging);
}

fn finish_file(out: BufWriter<File>, staging: &Path, destination: &Path, size: u64) -> io::Result<()> {
    let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()?;
    drop(file);

    let written = fs::metadata(staging)?.len();
    if written != size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} bytes, wrote {}", size, written),
        ));
    }

    if destination.exists() {
        fs::remove_file(destination)?;
    }
    fs::rename(staging, destination)
}

/// Resolve a remote descriptor name below `root`.
///
/// Returns the destination and its staging path, creating intermediate
/// directories. Names that would leave `root` are rejected.
pub(crate) fn staging_paths(root: &Path, name: &str, suffix: &str) -> io::Result<(PathBuf, PathBuf)> {
    if root.as_os_str().is_empty() || name.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty destination or file name"));
    }

    let relative = name.replace('\\', "/");
    let mut destination = root.to_path_buf();
    for component in Path::new(&relative).components() {
        match component {
            Component::Normal(part) => destination.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{:?} escapes the destination", name),
                ));
            }
        }
    }
    if destination == root {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty file name"));
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut staging = destination.clone().into_os_string();
    staging.push(suffix);
    Ok((destination, PathBuf::from(staging)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_paths_nested() {
        let dir = tempfile::tempdir().unwrap();
        let (dest, part) = staging_paths(dir.path(), "photos\\2024\\a.jpg", ".part").unwrap();
        assert_eq!(dest, dir.path().join("photos/2024/a.jpg"));
        assert_eq!(part, dir.path().join("photos/2024/a.jpg.part"));
        assert!(dir.path().join("photos/2024").is_dir());
    }

    #[test]
    fn test_staging_paths_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        assert!(staging_paths(dir.path(), "..\\etc\\passwd", ".part").is_err());
        assert!(staging_paths(dir.path(), "/etc/passwd", ".part").is_err());
        assert!(staging_paths(dir.path(), "", ".part").is_err());
        assert!(staging_paths(Path::new(""), "a.txt", ".part").is_err());
        assert!(staging_paths(dir.path(), ".\\.", ".part").is_err());
    }

    #[test]
    fn test_chunk_doubles_on_fast_round_trip() {
        let mut progress = Progress::new(1 << 30, &TransferConfig::default());
        assert_eq!(progress.next_block(1 << 30), 0x4000);

        progress.record(0x4000, Duration::from_millis(5));
        assert_eq!(progress.chunk, 0x8000);

        progress.record(0x8000, Duration::from_secs(2));
        assert_eq!(progress.chunk, 0x8000);
    }

    #[test]
    fn test_chunk_capped_at_max() {
        let config = TransferConfig {
            initial_chunk_size: 0x4000,
            max_chunk_size: 0x6000,
            ..TransferConfig::default()
        };
        let mut progress = Progress::new(1 << 20, &config);
        progress.record(0x4000, Duration::ZERO);
        assert_eq!(progress.chunk, 0x4000);
    }

    #[test]
    fn test_chunk_reaches_exact_max() {
        let config = TransferConfig {
            initial_chunk_size: 0x4000,
            max_chunk_size: 0x8000,
            ..TransferConfig::default()
        };
        let mut progress = Progress::new(1 << 20, &config);
        progress.record(0x4000, Duration::ZERO);
        progress.record(0x8000, Duration::ZERO);
        assert_eq!(progress.chunk, 0x8000);
        assert_eq!(progress.next_block(10), 10);
    }

    #[test]
    fn test_percent() {
        let mut progress = Progress::new(200, &TransferConfig::default());
        assert_eq!(progress.percent(), 0);
        progress.record(50, Duration::from_secs(5));
        assert_eq!(progress.percent(), 25);
        progress.record(150, Duration::from_secs(5));
        assert_eq!(progress.percent(), 100);
        assert_eq!(Progress::new(0, &TransferConfig::default()).percent(), 100);
    }

    #[test]
    fn test_abort_wakes_idle_wait() {
        let tracker = Arc::new(Tracker::new(PathBuf::from("/tmp")));
        tracker.expect(Exchange::FileContents).unwrap();

        let aborter = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                tracker.request_abort();
            })
        };

        let result = tracker.await_response(&tracker.file_contents);
        assert!(matches!(result, Err(TransferStop::Aborted)));
        aborter.join().unwrap();

        // a late answer is not claimed and does not block the transport
        assert_eq!(tracker.deliver_file_contents(&FileContentsResponse::fail(0)), None);
        assert!(matches!(tracker.expect(Exchange::FileContents), Err(TransferStop::Aborted)));
    }

    #[test]
    fn test_unexpected_exchange_not_claimed() {
        let tracker = Tracker::new(PathBuf::from("/tmp"));
        tracker.expect(Exchange::FormatData).unwrap();
        assert_eq!(tracker.deliver_file_contents(&FileContentsResponse::fail(0)), None);
    }

    #[test]
    fn test_foreign_stream_not_claimed() {
        let tracker = Tracker::new(PathBuf::from("/tmp"));
        let other = Tracker::new(PathBuf::from("/tmp"));
        assert_ne!(tracker.stream_id, other.stream_id);

        tracker.expect(Exchange::FileContents).unwrap();
        assert_eq!(tracker.deliver_file_contents(&FileContentsResponse::fail(other.stream_id)), None);
        assert!(tracker.withdraw());
    }

    #[test]
    fn test_claimed_exchange_drained_on_abort() {
        let tracker = Arc::new(Tracker::new(PathBuf::from("/tmp")));
        tracker.expect(Exchange::FormatData).unwrap();
        // transport claims first, then the abort lands before the worker waits
        assert!(tracker.claim(Exchange::FormatData));
        tracker.request_abort();

        let transport = {
            let tracker = Arc::clone(&tracker);
            std::thread::spawn(move || tracker.format_data.deliver(FormatDataResponse::ok(vec![1u8])))
        };

        let result = tracker.await_response(&tracker.format_data);
        assert!(matches!(result, Err(TransferStop::Aborted) | Ok(_)));
        drop(result);
        assert_eq!(transport.join().unwrap(), ResponseStatus::Fail);
    }
}
