//! Per-connection clipboard state.
//!
//! One [`Session`] exists per CLIPRDR connection and is shared by the
//! transport thread, the UI thread and the download worker. The pending
//! fetch state and the synchronous handoff slot sit under one mutex with a
//! condition variable; the active transfer has its own slot.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clipsync_core::{local_type_for_remote, LocalType};
use parking_lot::{Condvar, Mutex};

use super::download::{TransferHandle, Tracker};
use super::error::{ClipSyncError, Result};
use super::ui::{ClipContent, RemoteTarget};

/// What the session is currently waiting for from the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingFetch {
    /// Nothing outstanding
    #[default]
    None,
    /// A caller is blocked in `request_data`
    SyncWait,
    /// `request_data` timed out; a late answer is installed on arrival
    AsyncWait,
    /// A file download owns the channel
    FileTransferActive,
}

/// Format ids of the file pseudo-formats announced by the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NegotiatedFormats {
    /// "FileGroupDescriptorW"
    pub file_group_descriptor: Option<u32>,
    /// "FileContents"
    pub file_contents: Option<u32>,
    /// "Preferred DropEffect"
    pub preferred_drop_effect: Option<u32>,
}

impl NegotiatedFormats {
    /// Files can be pasted only when all three pseudo-formats were announced
    pub fn files_available(&self) -> bool {
        self.file_formats().is_some()
    }

    /// The complete set of file format ids, if every one is known
    pub fn file_formats(&self) -> Option<FileFormats> {
        Some(FileFormats {
            descriptor: self.file_group_descriptor?,
            contents: self.file_contents?,
            drop_effect: self.preferred_drop_effect?,
        })
    }
}

/// File pseudo-format ids, all present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFormats {
    /// "FileGroupDescriptorW"
    pub descriptor: u32,
    /// "FileContents"
    pub contents: u32,
    /// "Preferred DropEffect"
    pub drop_effect: u32,
}

/// Outcome of handing a format data answer to the fetch slot
#[derive(Debug)]
pub(crate) enum FetchCompletion {
    /// A blocked caller picked it up
    Delivered,
    /// The caller gave up; install the content directly
    Install(Option<ClipContent>),
    /// Nobody asked for it
    Dropped,
}

#[derive(Debug, Default)]
struct FetchSlot {
    state: PendingFetch,
    requested_format: Option<u32>,
    // Outer None: nothing arrived yet. Inner None: the remote had no data.
    arrived: Option<Option<ClipContent>>,
}

/// Shared state of one clipboard connection
#[derive(Debug, Default)]
pub struct Session {
    fetch: Mutex<FetchSlot>,
    fetch_arrived: Condvar,
    formats: Mutex<NegotiatedFormats>,
    offered: Mutex<Vec<RemoteTarget>>,
    served_files: Mutex<Vec<PathBuf>>,
    transfer: Mutex<Option<TransferHandle>>,
    remote_streaming: AtomicBool,
    ready: AtomicBool,
}

impl Session {
    /// Create an idle session
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pending fetch state
    pub fn pending(&self) -> PendingFetch {
        self.fetch.lock().state
    }

    /// True once capabilities and the first format list were sent
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// True if the remote announced streamed file copy
    pub fn remote_supports_streaming(&self) -> bool {
        self.remote_streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_remote_streaming(&self, enabled: bool) {
        self.remote_streaming.store(enabled, Ordering::Release);
    }

    /// File pseudo-format ids from the latest remote format list
    pub fn negotiated_formats(&self) -> NegotiatedFormats {
        *self.formats.lock()
    }

    /// Targets installed from the latest remote format list
    pub fn offered_targets(&self) -> Vec<RemoteTarget> {
        self.offered.lock().clone()
    }

    pub(crate) fn install_remote_offer(&self, formats: NegotiatedFormats, targets: Vec<RemoteTarget>) {
        *self.formats.lock() = formats;
        *self.offered.lock() = targets;
    }

    pub(crate) fn clear_remote_offer(&self) {
        self.install_remote_offer(NegotiatedFormats::default(), Vec::new());
    }

    /// Local type a remote format id decodes to, preferring the ids the
    /// remote actually announced.
    pub(crate) fn local_type_of(&self, format_id: u32) -> Option<LocalType> {
        self.offered
            .lock()
            .iter()
            .find(|target| target.format_id == format_id)
            .map(|target| target.local)
            .or_else(|| local_type_for_remote(format_id))
    }

    // =========================================================================
    // Synchronous fetch
    // =========================================================================

    pub(crate) fn begin_sync_fetch(&self, format_id: u32) -> Result<()> {
        let mut fetch = self.fetch.lock();
        if fetch.state != PendingFetch::None {
            return Err(ClipSyncError::Busy);
        }
        fetch.state = PendingFetch::SyncWait;
        fetch.requested_format = Some(format_id);
        fetch.arrived = None;
        Ok(())
    }

    /// Undo `begin_sync_fetch` when the request never left
    pub(crate) fn abandon_sync_fetch(&self) {
        let mut fetch = self.fetch.lock();
        if fetch.state == PendingFetch::SyncWait {
            *fetch = FetchSlot::default();
        }
    }

    /// Block until the answer arrives or `timeout` elapses.
    ///
    /// On timeout the state moves to [`PendingFetch::AsyncWait`] and `None`
    /// is returned.
    pub(crate) fn wait_for_fetch(&self, timeout: Duration) -> Option<Option<ClipContent>> {
        let deadline = Instant::now() + timeout;
        let mut fetch = self.fetch.lock();
        loop {
            if let Some(arrived) = fetch.arrived.take() {
                *fetch = FetchSlot::default();
                return Some(arrived);
            }
            if self.fetch_arrived.wait_until(&mut fetch, deadline).timed_out() {
                if let Some(arrived) = fetch.arrived.take() {
                    *fetch = FetchSlot::default();
                    return Some(arrived);
                }
                fetch.state = PendingFetch::AsyncWait;
                return None;
            }
        }
    }

    /// Format id of the outstanding synchronous or late request
    pub(crate) fn requested_format(&self) -> Option<u32> {
        let fetch = self.fetch.lock();
        match fetch.state {
            PendingFetch::SyncWait | PendingFetch::AsyncWait => fetch.requested_format,
            _ => None,
        }
    }

    pub(crate) fn complete_fetch(&self, content: Option<ClipContent>) -> FetchCompletion {
        let mut fetch = self.fetch.lock();
        match fetch.state {
            PendingFetch::SyncWait => {
                fetch.arrived = Some(content);
                self.fetch_arrived.notify_one();
                FetchCompletion::Delivered
            }
            PendingFetch::AsyncWait => {
                *fetch = FetchSlot::default();
                FetchCompletion::Install(content)
            }
            PendingFetch::None | PendingFetch::FileTransferActive => FetchCompletion::Dropped,
        }
    }

    // =========================================================================
    // File transfer slot
    // =========================================================================

    /// Fail with [`ClipSyncError::Busy`] while a synchronous or late fetch is outstanding
    pub(crate) fn ensure_no_fetch(&self) -> Result<()> {
        match self.pending() {
            PendingFetch::SyncWait | PendingFetch::AsyncWait => Err(ClipSyncError::Busy),
            PendingFetch::None | PendingFetch::FileTransferActive => Ok(()),
        }
    }

    /// Install a new transfer. `start` runs with the slot locked, so the
    /// worker it spawns cannot release the slot before the handle is stored.
    /// The file format ids are read under the same lock; a format list that
    /// clears them first makes this fail with `NoFileData`, and one that
    /// clears them afterwards aborts the worker started here.
    pub(crate) fn start_transfer(&self, start: impl FnOnce(FileFormats) -> Result<TransferHandle>) -> Result<()> {
        let mut slot = self.transfer.lock();
        let formats = {
            let mut fetch = self.fetch.lock();
            if fetch.state != PendingFetch::None {
                return Err(ClipSyncError::Busy);
            }
            let formats = self.negotiated_formats().file_formats().ok_or(ClipSyncError::NoFileData)?;
            fetch.state = PendingFetch::FileTransferActive;
            formats
        };

        match start(formats) {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.end_file_transfer();
                Err(err)
            }
        }
    }

    /// Take the active transfer out of the slot
    pub(crate) fn take_transfer(&self) -> Option<TransferHandle> {
        self.transfer.lock().take()
    }

    /// Tracker of the active transfer
    pub(crate) fn tracker(&self) -> Option<Arc<Tracker>> {
        self.transfer.lock().as_ref().map(TransferHandle::tracker)
    }

    /// True while a download worker is registered
    pub fn transfer_active(&self) -> bool {
        self.transfer.lock().is_some()
    }

    /// Worker exit: clear the slot if it still holds `tracker`
    pub(crate) fn release_transfer(&self, tracker: &Arc<Tracker>) {
        let mut slot = self.transfer.lock();
        if slot.as_ref().is_some_and(|handle| handle.owns(tracker)) {
            // detaches the worker's own join handle
            slot.take();
            self.end_file_transfer();
        }
    }

    pub(crate) fn end_file_transfer(&self) {
        let mut fetch = self.fetch.lock();
        if fetch.state == PendingFetch::FileTransferActive {
            fetch.state = PendingFetch::None;
        }
    }

    // =========================================================================
    // Locally copied files
    // =========================================================================

    pub(crate) fn set_served_files(&self, files: Vec<PathBuf>) {
        *self.served_files.lock() = files;
    }

    pub(crate) fn served_file(&self, index: u32) -> Option<PathBuf> {
        self.served_files.lock().get(index as usize).cloned()
    }
}
