//! UI-thread seam
//!
//! The local clipboard and the paste-status display belong to a single UI
//! thread. Other threads never touch them directly: they post a [`UiJob`]
//! through a [`UiHandle`] and block on the job's reply channel.
//!
//! ```text
//! transport / worker thread            UI thread
//! ─────────────────────────            ─────────
//! UiHandle::call(job) ──── jobs ────►  job.run(&mut clipboard)
//!        ▲                                   │
//!        └────────── reply (bounded 1) ◄─────┘
//! ```

use std::io;
use std::thread::JoinHandle;

use clipsync_core::LocalType;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use image::DynamicImage;
use tracing::{trace, Span};

use super::error::{ClipSyncError, Result};

/// Decoded clipboard content
#[derive(Debug, Clone, PartialEq)]
pub enum ClipContent {
    /// UTF-8 text with LF line endings (plain text or HTML markup)
    Text(String),
    /// Decoded image
    Image(DynamicImage),
}

/// A local target backed by a remote format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Local type offered to applications
    pub local: LocalType,
    /// Remote format id to request when an application pastes it
    pub format_id: u32,
}

impl RemoteTarget {
    /// Target name offered locally
    pub fn target_name(&self) -> &'static str {
        self.local.target_name()
    }
}

/// The local clipboard, as seen from the UI thread
pub trait LocalClipboard {
    /// Target names currently on the local clipboard
    fn targets(&self) -> Vec<String>;

    /// Read a text-like target (plain text, HTML, or a URI list)
    fn read_text(&self, kind: LocalType) -> Option<String>;

    /// Read the clipboard image
    fn read_image(&self) -> Option<DynamicImage>;

    /// Take clipboard ownership and offer the remote formats locally
    fn offer_remote_targets(&mut self, targets: &[RemoteTarget]);

    /// Replace the local clipboard content
    fn set_content(&mut self, content: ClipContent);

    /// Give up clipboard ownership
    fn release_ownership(&mut self);
}

/// Work items executed on the UI thread
#[derive(Debug)]
pub enum UiJob {
    /// List the local targets
    CollectTargets {
        /// Reply channel
        reply: Sender<Vec<String>>,
    },
    /// Read local data for one target
    CollectData {
        /// Target to read
        format: LocalType,
        /// Reply channel
        reply: Sender<Option<ClipContent>>,
    },
    /// Install the targets announced by the remote
    OfferRemoteTargets {
        /// Targets to offer
        targets: Vec<RemoteTarget>,
        /// Reply channel
        reply: Sender<()>,
    },
    /// Install content fetched from the remote
    SetContent {
        /// Content to install
        content: ClipContent,
        /// Reply channel
        reply: Sender<()>,
    },
    /// Drop local clipboard ownership
    ReleaseOwnership {
        /// Reply channel
        reply: Sender<()>,
    },
}

impl UiJob {
    /// Execute against the clipboard and send the reply.
    ///
    /// A caller that stopped waiting is not an error.
    pub fn run(self, clipboard: &mut dyn LocalClipboard) {
        match self {
            UiJob::CollectTargets { reply } => {
                let _ = reply.send(clipboard.targets());
            }
            UiJob::CollectData { format, reply } => {
                let content = if format.is_image() {
                    clipboard.read_image().map(ClipContent::Image)
                } else {
                    clipboard.read_text(format).map(ClipContent::Text)
                };
                let _ = reply.send(content);
            }
            UiJob::OfferRemoteTargets { targets, reply } => {
                clipboard.offer_remote_targets(&targets);
                let _ = reply.send(());
            }
            UiJob::SetContent { content, reply } => {
                clipboard.set_content(content);
                let _ = reply.send(());
            }
            UiJob::ReleaseOwnership { reply } => {
                clipboard.release_ownership();
                let _ = reply.send(());
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            UiJob::CollectTargets { .. } => "collect-targets",
            UiJob::CollectData { .. } => "collect-data",
            UiJob::OfferRemoteTargets { .. } => "offer-remote-targets",
            UiJob::SetContent { .. } => "set-content",
            UiJob::ReleaseOwnership { .. } => "release-ownership",
        }
    }
}

/// Posts jobs to the UI thread
#[derive(Debug, Clone)]
pub struct UiHandle {
    jobs: Sender<UiJob>,
}

impl UiHandle {
    /// Wrap an existing job queue; the caller drains the receiver on its UI thread
    pub fn new(jobs: Sender<UiJob>) -> Self {
        Self { jobs }
    }

    /// Create a handle and the receiver the UI thread should drain
    pub fn channel() -> (Self, Receiver<UiJob>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    /// Queue a job without waiting for it. Safe to call from the UI thread.
    pub fn post(&self, job: UiJob) -> Result<()> {
        self.jobs.send(job).map_err(|_| ClipSyncError::UiUnavailable)
    }

    /// Post a job and block until the UI thread has run it.
    ///
    /// Must not be called from the UI thread itself.
    pub fn call<R>(&self, make_job: impl FnOnce(Sender<R>) -> UiJob) -> Result<R> {
        let (reply, response) = bounded(1);
        self.jobs.send(make_job(reply)).map_err(|_| ClipSyncError::UiUnavailable)?;
        response.recv().map_err(|_| ClipSyncError::UiUnavailable)
    }
}

/// Run `clipboard` on a dedicated UI thread.
///
/// The thread exits once every [`UiHandle`] is dropped and hands the
/// clipboard back through the join handle.
pub fn spawn_ui_thread<C>(mut clipboard: C, span: Span) -> io::Result<(UiHandle, JoinHandle<C>)>
where
    C: LocalClipboard + Send + 'static,
{
    let (handle, jobs) = UiHandle::channel();
    let thread = std::thread::Builder::new()
        .name("clipsync-ui".to_string())
        .spawn(move || {
            for job in jobs {
                trace!(parent: &span, job = job.name(), "Running UI job");
                job.run(&mut clipboard);
            }
            clipboard
        })?;
    Ok((handle, thread))
}

// =============================================================================
// Paste status
// =============================================================================

/// Status pushed to the paste UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteFilesStatus {
    /// Transfer progress in percent
    Progress(u8),
    /// Files can be pasted (idle or finished)
    Ready,
    /// The remote clipboard holds no files
    NoFiles,
}

impl PasteFilesStatus {
    /// Numeric status code: 0..=100 for progress, -1 for ready, -2 for no files
    pub fn code(self) -> i32 {
        match self {
            PasteFilesStatus::Progress(percent) => i32::from(percent),
            PasteFilesStatus::Ready => -1,
            PasteFilesStatus::NoFiles => -2,
        }
    }
}

/// Receives paste status updates. Called from the transport and worker threads.
pub trait PasteStatusSink: Send + Sync {
    /// Report a status change
    fn pastefiles_status(&self, status: PasteFilesStatus);
}

impl PasteStatusSink for Sender<PasteFilesStatus> {
    fn pastefiles_status(&self, status: PasteFilesStatus) {
        let _ = self.send(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        offered: Vec<RemoteTarget>,
        content: Option<ClipContent>,
        owned: bool,
    }

    impl LocalClipboard for Recorder {
        fn targets(&self) -> Vec<String> {
            vec!["UTF8_STRING".to_string()]
        }

        fn read_text(&self, kind: LocalType) -> Option<String> {
            (kind == LocalType::Utf8Text).then(|| "hello".to_string())
        }

        fn read_image(&self) -> Option<DynamicImage> {
            None
        }

        fn offer_remote_targets(&mut self, targets: &[RemoteTarget]) {
            self.offered = targets.to_vec();
            self.owned = true;
        }

        fn set_content(&mut self, content: ClipContent) {
            self.content = Some(content);
        }

        fn release_ownership(&mut self) {
            self.owned = false;
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PasteFilesStatus::Progress(0).code(), 0);
        assert_eq!(PasteFilesStatus::Progress(100).code(), 100);
        assert_eq!(PasteFilesStatus::Ready.code(), -1);
        assert_eq!(PasteFilesStatus::NoFiles.code(), -2);
    }

    #[test]
    fn test_jobs_run_on_ui_thread() {
        let (ui, thread) = spawn_ui_thread(Recorder::default(), Span::none()).unwrap();

        let targets = ui.call(|reply| UiJob::CollectTargets { reply }).unwrap();
        assert_eq!(targets, vec!["UTF8_STRING".to_string()]);

        let data = ui
            .call(|reply| UiJob::CollectData {
                format: LocalType::Utf8Text,
                reply,
            })
            .unwrap();
        assert_eq!(data, Some(ClipContent::Text("hello".to_string())));

        let missing = ui
            .call(|reply| UiJob::CollectData {
                format: LocalType::Png,
                reply,
            })
            .unwrap();
        assert_eq!(missing, None);

        let target = RemoteTarget {
            local: LocalType::Html,
            format_id: 0xC004,
        };
        ui.call(|reply| UiJob::OfferRemoteTargets {
            targets: vec![target],
            reply,
        })
        .unwrap();
        ui.call(|reply| UiJob::SetContent {
            content: ClipContent::Text("x".to_string()),
            reply,
        })
        .unwrap();

        drop(ui);
        let recorder = thread.join().unwrap();
        assert_eq!(recorder.offered, vec![target]);
        assert!(recorder.owned);
        assert_eq!(recorder.content, Some(ClipContent::Text("x".to_string())));
    }

    #[test]
    fn test_call_after_ui_exit() {
        let (ui, jobs) = UiHandle::channel();
        drop(jobs);
        assert!(matches!(
            ui.call(|reply| UiJob::ReleaseOwnership { reply }),
            Err(ClipSyncError::UiUnavailable)
        ));
    }

    #[test]
    fn test_sender_as_status_sink() {
        let (tx, rx) = unbounded();
        tx.pastefiles_status(PasteFilesStatus::Progress(42));
        assert_eq!(rx.try_recv().unwrap(), PasteFilesStatus::Progress(42));
    }
}
