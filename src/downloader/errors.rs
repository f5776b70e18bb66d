// Error types for the orchestrator and its video sources

use thiserror::Error;

use super::diagnostics::{diagnose_error, Unavailability};
use super::models::StreamId;

/// Errors surfaced by [`Downloader`](super::Downloader) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected by the URL heuristic, no I/O attempted
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    /// Metadata fetch failed (network, unavailable video, malformed response)
    #[error("Failed to load video: {0}")]
    Resolution(#[source] SourceError),

    /// Operation needs a successful `load()` first
    #[error("No video loaded. Call load() first.")]
    NotLoaded,

    /// Identifier not present in the current catalog
    #[error("No stream found for id={0}")]
    UnknownStream(StreamId),

    /// Transfer failed after metadata succeeded
    #[error("Download failed: {0}")]
    Download(#[source] SourceError),
}

/// Errors reported by a [`VideoSource`](super::VideoSource) backend.
#[derive(Debug, Error)]
pub enum SourceError {
    /// yt-dlp (or another backing tool) could not be started
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The platform refused to serve the video
    #[error("{}: {message}", .reason.description())]
    Unavailable {
        reason: Unavailability,
        message: String,
    },

    /// Tool exited with an error we could not classify
    #[error("Execution error: {0}")]
    Tool(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source has no format with this id
    #[error("Unknown format: {0}")]
    UnknownFormat(StreamId),
}

impl SourceError {
    /// Classify the stderr of a failed tool run.
    pub fn from_tool_output(stderr: &str) -> Self {
        let message = first_error_line(stderr);

        match diagnose_error(stderr) {
            Some(reason) => Self::Unavailable { reason, message },
            None => Self::Tool(message),
        }
    }
}

/// Pick the line yt-dlp prefixes with `ERROR:`, else the last non-empty one.
fn first_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .iter()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "tool exited without output".to_string())
}
