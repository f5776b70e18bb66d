// Terminal shell: argument parsing, progress rendering, worker dispatch
//
// Each orchestrator operation runs on a spawned worker task. Progress events
// come back over a channel and are rendered on the interactive task.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::downloader::backends::ytdlp::DEFAULT_METADATA_TIMEOUT_SECS;
use crate::downloader::backends::{SourceConfig, YtDlpSource};
use crate::downloader::models::default_output_dir;
use crate::downloader::tools::ToolManager;
use crate::downloader::{
    is_probable_video_url, Downloader, ProgressEvent, StreamDescriptor, StreamId, VideoSource,
};

/// Exit code when the video resolved but offers nothing to download
const EXIT_NO_STREAMS: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "stream-downloader", version)]
#[command(about = "List the streams of a video URL and save one to disk")]
pub struct Cli {
    /// Video URL (youtube.com/watch?v=... or youtu.be/...)
    pub url: String,

    /// Output folder (created if missing)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Stream id to download, as shown by --list
    #[arg(long, value_name = "ID", conflicts_with = "pick")]
    pub stream: Option<String>,

    /// 1-based position in the catalog to download
    #[arg(long, value_name = "N")]
    pub pick: Option<usize>,

    /// Print the available streams and exit
    #[arg(short, long)]
    pub list: bool,

    /// With --list, print the catalog as JSON
    #[arg(long, requires = "list")]
    pub json: bool,

    /// Path to the yt-dlp binary (defaults to $YTDLP_PATH or a PATH lookup)
    #[arg(long = "yt-dlp", value_name = "PATH")]
    pub ytdlp: Option<PathBuf>,

    /// Proxy URL passed to yt-dlp (e.g. socks5://127.0.0.1:1080)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Socket timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u32,

    /// Wall-clock limit in seconds for fetching video metadata
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_METADATA_TIMEOUT_SECS)]
    pub metadata_timeout: u64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Console logging; `RUST_LOG` overrides the -v level
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stream_downloader_lib={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// How a run ended, mapped to the process exit code by [`Outcome::exit_code`]
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Listed,
    Downloaded(PathBuf),
    /// The video resolved but has no streams
    NoStreams,
}

impl Outcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Listed | Self::Downloaded(_) => ExitCode::SUCCESS,
            Self::NoStreams => ExitCode::from(EXIT_NO_STREAMS),
        }
    }
}

pub async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let explicit = cli.ytdlp.clone();
    let ytdlp_path = tokio::task::spawn_blocking(move || ToolManager::locate_ytdlp(explicit.as_deref()))
        .await
        .context("tool lookup panicked")?;
    let tool = ToolManager::tool_info(&ytdlp_path).await;
    if tool.is_available {
        info!(
            "Using {} {} at {}",
            tool.name,
            tool.version.as_deref().unwrap_or_default(),
            tool.path.display()
        );
    } else {
        warn!("{} at {} did not report a version", tool.name, tool.path.display());
    }

    let config = SourceConfig::new(ytdlp_path)
        .with_proxy(cli.proxy.clone())
        .with_socket_timeout(cli.timeout)
        .with_metadata_timeout(cli.metadata_timeout);

    let mut stderr = std::io::stderr();
    let outcome = run_with_source(cli, Arc::new(YtDlpSource::new(config)), |event| {
        let _ = write!(stderr, "\r{}", render_progress(event));
        let _ = stderr.flush();
    })
    .await?;
    Ok(outcome.exit_code())
}

/// Drive one load (and optionally one download) against `source`.
///
/// Orchestrator calls run on worker tasks; `on_progress` runs on the calling
/// task for every event the download worker sends back.
pub async fn run_with_source<P>(
    cli: Cli,
    source: Arc<dyn VideoSource>,
    mut on_progress: P,
) -> anyhow::Result<Outcome>
where
    P: FnMut(&ProgressEvent),
{
    let url = cli.url.trim().to_string();
    if !is_probable_video_url(&url) {
        bail!("Invalid URL: please paste a valid YouTube video URL");
    }

    let mut downloader = Downloader::new(source);

    eprintln!("Loading video info…");
    let worker_url = url.clone();
    let (mut downloader, loaded) = tokio::spawn(async move {
        let result = downloader.load(&worker_url).await;
        (downloader, result)
    })
    .await
    .context("load worker panicked")?;
    loaded.with_context(|| format!("Fetch error for {}", url))?;

    let title = downloader.title()?.to_string();
    let streams = downloader.list_streams()?;
    if streams.is_empty() {
        eprintln!("No streams found.");
        return Ok(Outcome::NoStreams);
    }

    if cli.list {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&streams)?);
        } else {
            println!("{}", title);
            print_catalog(&streams);
        }
        return Ok(Outcome::Listed);
    }

    let selected = select_stream(&streams, cli.stream.as_deref(), cli.pick)?;
    let output_dir = cli.output.unwrap_or_else(default_output_dir);
    eprintln!("Downloading {} → {}", selected.display_label(), output_dir.display());

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let stream_id = selected.id().clone();
    let worker = tokio::spawn(async move {
        downloader
            .download(&stream_id, &output_dir, move |event| {
                // Receiver only goes away once the interactive loop has ended
                let _ = tx.send(event);
            })
            .await
    });

    // Ends once the worker drops its sender
    while let Some(event) = rx.recv().await {
        on_progress(&event);
    }
    eprintln!();

    let path = worker.await.context("download worker panicked")??;
    println!("Downloaded:\n{}", path.display());
    Ok(Outcome::Downloaded(path))
}

fn print_catalog(streams: &[StreamDescriptor]) {
    for (idx, stream) in streams.iter().enumerate() {
        let size = format_size(stream.size_bytes())
            .map(|s| format!(" ({})", s))
            .unwrap_or_default();
        println!("{:>3}. [{}] {}{}", idx + 1, stream.id(), stream.display_label(), size);
    }
}

/// Resolve the user's choice; the first entry when nothing was requested
fn select_stream<'a>(
    streams: &'a [StreamDescriptor],
    id: Option<&str>,
    pick: Option<usize>,
) -> anyhow::Result<&'a StreamDescriptor> {
    if let Some(id) = id {
        let wanted = StreamId::from(id);
        return streams
            .iter()
            .find(|s| s.id() == &wanted)
            .ok_or_else(|| anyhow!("No stream with id {} (see --list)", id));
    }

    let position = pick.unwrap_or(1);
    position
        .checked_sub(1)
        .and_then(|idx| streams.get(idx))
        .ok_or_else(|| anyhow!("--pick must be between 1 and {}", streams.len()))
}

fn render_progress(event: &ProgressEvent) -> String {
    match event.percent() {
        Some(percent) => format!("Progress: {:>3}%", percent as u32),
        None => format!(
            "Progress: {} received",
            format_size(Some(event.bytes_received)).unwrap_or_default()
        ),
    }
}

/// Format file size for display
fn format_size(bytes: Option<u64>) -> Option<String> {
    bytes.map(|b| {
        let mb = b as f64 / 1_048_576.0;
        if mb >= 1024.0 {
            format!("{:.1} GB", mb / 1024.0)
        } else {
            format!("{:.1} MB", mb)
        }
    })
}
