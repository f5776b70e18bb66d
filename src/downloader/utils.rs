// Helper functions shared by the orchestrator and backends

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use crate::downloader::errors::SourceError;
use crate::downloader::models::NetworkConfig;

/// Titles longer than this are truncated with an ellipsis
pub const DEFAULT_MAX_FILENAME_LEN: usize = 180;

/// Used when a title has no usable characters left
const FALLBACK_FILENAME: &str = "video";
const ELLIPSIS: &str = "...";

lazy_static::lazy_static! {
    // Watch URLs (youtube.com/watch?v=ID) and short links (youtu.be/ID)
    static ref VIDEO_URL_RE: Regex = Regex::new(
        r"^(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[A-Za-z0-9_\-]{6,}"
    ).unwrap();
}

/// Quick heuristic validation for watch and short video URLs.
///
/// Purely syntactic: a string that passes may still fail to resolve.
pub fn is_probable_video_url(url: &str) -> bool {
    VIDEO_URL_RE.is_match(url.trim())
}

fn is_allowed_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')')
}

/// Make a filesystem-safe base name out of a video title.
///
/// Disallowed characters (path separators and control characters included)
/// become `_`, then leading/trailing spaces, dots and underscores are trimmed.
/// Results longer than `max_len` characters end in `...` when the limit
/// leaves room for it.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_allowed_filename_char(c) { c } else { '_' })
        .collect();
    let cleaned = replaced.trim_matches(|c| matches!(c, ' ' | '.' | '_'));

    if cleaned.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    // Only ASCII survives the mapping above, so byte length == char count
    if cleaned.len() > max_len {
        // No room for an ellipsis, hard cut instead
        if max_len <= ELLIPSIS.len() {
            return cleaned[..max_len.max(1)]
                .trim_end_matches(|c| matches!(c, ' ' | '.' | '_'))
                .to_string();
        }
        return format!("{}{}", &cleaned[..max_len - ELLIPSIS.len()], ELLIPSIS);
    }

    cleaned.to_string()
}

/// Create directory (and parents) if missing, return its absolute path
pub async fn ensure_directory(path: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(path).await?;
    tokio::fs::canonicalize(path).await
}

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &Path,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<Output, SourceError> {
    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        SourceError::Tool(format!("Failed to capture stdout from {}", program.display()))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        SourceError::Tool(format!("Failed to capture stderr from {}", program.display()))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(SourceError::Timeout(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, SourceError> {
    task.await
        .map_err(|e| SourceError::Tool(format!("pipe reader failed: {}", e)))?
        .map_err(SourceError::from)
}

/// Distinguish "binary missing" from other spawn failures
pub fn spawn_error(program: &Path, e: std::io::Error) -> SourceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SourceError::ToolNotFound(program.display().to_string())
    } else {
        SourceError::Io(e)
    }
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}
