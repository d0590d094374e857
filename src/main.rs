//! rdp-clipsync - CLIPRDR clipboard synchronization
//!
//! Entry point for the loopback binary: a simulated remote offers a
//! directory (and optionally some text) and the client pastes it locally.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use tracing::{info, info_span, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use clipsync_core::CF_UNICODETEXT;
use rdp_clipsync::clipboard::{spawn_ui_thread, ClipContent, CliprdrClient, PasteFilesStatus};
use rdp_clipsync::config::{Config, LoggingConfig};
use rdp_clipsync::loopback::{LoopbackPeer, LoopbackTransport, MemoryClipboard, RemoteFiles};

/// Command-line arguments for rdp-clipsync
#[derive(Parser, Debug)]
#[command(name = "rdp-clipsync")]
#[command(version, about = "RDP clipboard synchronization over a loopback channel", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CLIPSYNC_CONFIG", default_value = "/etc/rdp-clipsync/config.toml")]
    pub config: String,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Directory the simulated remote offers as copied files
    #[arg(short, long, env = "CLIPSYNC_SOURCE")]
    pub source: Option<PathBuf>,

    /// Paste destination (defaults to transfer.download_dir)
    #[arg(short, long, env = "CLIPSYNC_DEST")]
    pub dest: Option<PathBuf>,

    /// Text the simulated remote offers
    #[arg(short, long)]
    pub text: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load(&args.config);
    let config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default_config()?,
    };

    let _guard = init_logging(&args, &config.logging)?;

    info!("════════════════════════════════════════════════════════");
    info!("  rdp-clipsync v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if let Err(e) = loaded {
        warn!("Failed to load config: {:#}, using defaults", e);
    }
    tracing::debug!("Config: {:?}", config);

    if !config.clipboard.enabled {
        info!("Clipboard synchronization disabled in configuration");
        return Ok(());
    }

    let files = match &args.source {
        Some(source) => RemoteFiles::scan(source).with_context(|| format!("Failed to scan {}", source.display()))?,
        None => RemoteFiles::default(),
    };
    info!(entries = files.len(), bytes = files.total_size(), "Remote clipboard prepared");

    let span = info_span!("clipsync");
    let clipboard = MemoryClipboard::new();
    let (ui, ui_thread) = spawn_ui_thread(clipboard.clone(), info_span!(parent: &span, "ui"))?;
    let (status_tx, status_rx) = crossbeam_channel::unbounded();
    let (transport, inbox) = LoopbackTransport::channel();

    let client = Arc::new(CliprdrClient::new(
        Arc::new(transport.clone()),
        ui,
        Arc::new(status_tx),
        &config.clipboard,
        &config.transfer,
        span.clone(),
    ));

    let mut peer = LoopbackPeer::new().with_files(files);
    if let Some(text) = &args.text {
        peer = peer.with_text(text.clone());
    }
    let peer_thread = peer.spawn(client.handler(), inbox, info_span!(parent: &span, "peer"))?;

    let (status_rx, offered) = tokio::task::spawn_blocking(move || {
        let first = status_rx.recv_timeout(Duration::from_secs(5));
        (status_rx, first)
    })
    .await?;
    let offered = offered.context("Remote clipboard never announced its formats")?;

    let result = run_session(&args, &config, &client, &clipboard, status_rx, offered).await;

    client.teardown();
    transport.close();
    if peer_thread.join().is_err() {
        warn!("Peer thread panicked");
    }
    drop(client);
    if ui_thread.join().is_err() {
        warn!("UI thread panicked");
    }

    info!("rdp-clipsync shut down");
    result
}

async fn run_session(
    args: &Args,
    config: &Config,
    client: &Arc<CliprdrClient>,
    clipboard: &MemoryClipboard,
    status_rx: Receiver<PasteFilesStatus>,
    offered: PasteFilesStatus,
) -> Result<()> {
    let targets = clipboard.inspect(|state| state.targets.clone());
    info!(?targets, "Remote formats offered locally");

    if args.text.is_some() {
        let fetcher = Arc::clone(client);
        match tokio::task::spawn_blocking(move || fetcher.request_data(CF_UNICODETEXT)).await? {
            Ok(Some(ClipContent::Text(text))) => info!(chars = text.chars().count(), "Pasted text: {}", text),
            Ok(_) => info!("Remote answered without text"),
            Err(e) => warn!("Text paste failed: {}", e),
        }
    }

    if offered != PasteFilesStatus::Ready {
        info!("No files on the remote clipboard");
        return Ok(());
    }

    let dest = args
        .dest
        .clone()
        .or_else(|| config.transfer.resolved_download_dir())
        .context("No destination directory: pass --dest or set transfer.download_dir")?;
    std::fs::create_dir_all(&dest).with_context(|| format!("Failed to create {}", dest.display()))?;

    client.paste_files_to_directory(&dest)?;

    let mut progress = tokio::task::spawn_blocking(move || follow_progress(&status_rx));
    let interrupted = tokio::select! {
        finished = &mut progress => {
            finished??;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        warn!("Interrupted, stopping transfer");
        client.stop_transfer();
        progress.await??;
    }

    info!(destination = %dest.display(), "Paste finished");
    Ok(())
}

/// Log progress until the worker reports it is done
fn follow_progress(status_rx: &Receiver<PasteFilesStatus>) -> Result<()> {
    let mut last = None;
    loop {
        match status_rx.recv().context("Status channel closed during transfer")? {
            PasteFilesStatus::Progress(percent) => {
                if last != Some(percent) {
                    info!("Transfer progress: {}%", percent);
                    last = Some(percent);
                }
            }
            PasteFilesStatus::Ready | PasteFilesStatus::NoFiles => return Ok(()),
        }
    }
}

fn init_logging(args: &Args, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "rdp_clipsync={level},clipsync_core={level},clipsync_cliprdr={level},warn",
            level = log_level
        ))
    });

    let stdout_layer = match args.log_format.as_str() {
        "json" => fmt::layer().json().boxed(),
        "compact" => fmt::layer().compact().boxed(),
        _ => fmt::layer().pretty().boxed(),
    };

    // --log-file wins over logging.log_dir
    let (file_writer, guard) = if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        (Some(writer), Some(guard))
    } else if let Some(dir) = &logging.log_dir {
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "rdp-clipsync.log"));
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };
    let file_layer = file_writer.map(|writer| fmt::layer().with_writer(writer).with_ansi(false));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    if let Some(path) = &args.log_file {
        info!("Logging to file: {}", path.display());
    }
    Ok(guard)
}
