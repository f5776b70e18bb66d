// yt-dlp backend - drives the `yt-dlp` binary as a subprocess
//
// Metadata comes from `--dump-json`; transfers run `-f <format_id>` with a
// machine-readable progress template and `--print after_move:filepath` so
// the final path is reported on stdout.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::downloader::errors::SourceError;
use crate::downloader::models::{NetworkConfig, RawStream, StreamId, StreamKind};
use crate::downloader::tools::ToolManager;
use crate::downloader::traits::{ProgressFn, ResolvedVideo, VideoSource};
use crate::downloader::utils::{get_proxy_args, get_timeout_args, run_output_with_timeout, spawn_error};

const PROGRESS_MARKER: &str = "__stream_progress__";

pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 60;

lazy_static::lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(&format!(
        r"^{}\s+(\S+)\s+(\S+)\s+(\S+)\s*$",
        PROGRESS_MARKER
    )).unwrap();
    static ref NOTE_HEIGHT_RE: Regex = Regex::new(r"^(\d{2,4})p").unwrap();
}

/// Configuration for the yt-dlp backend
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub ytdlp_path: PathBuf,
    pub network: NetworkConfig,
    /// Wall-clock limit for `--dump-json`
    pub metadata_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new(ToolManager::locate_ytdlp(None))
    }
}

impl SourceConfig {
    /// Config for an already located yt-dlp binary
    pub fn new(ytdlp_path: PathBuf) -> Self {
        Self {
            ytdlp_path,
            network: NetworkConfig::default(),
            metadata_timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.network.proxy = proxy;
        self
    }

    pub fn with_socket_timeout(mut self, seconds: u32) -> Self {
        self.network.timeout = Some(seconds);
        self
    }

    pub fn with_metadata_timeout(mut self, seconds: u64) -> Self {
        self.metadata_timeout_secs = seconds;
        self
    }
}

pub struct YtDlpSource {
    config: Arc<SourceConfig>,
}

impl YtDlpSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];
        args.extend(get_timeout_args(&self.config.network));
        args.extend(get_proxy_args(&self.config.network));
        args.push(url.to_string());
        args
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new(SourceConfig::default())
    }
}

#[async_trait]
impl VideoSource for YtDlpSource {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<Box<dyn ResolvedVideo>, SourceError> {
        let args = self.metadata_args(url);
        debug!(
            "[yt-dlp] {} {}",
            self.config.ytdlp_path.display(),
            args.join(" ")
        );

        let output =
            run_output_with_timeout(&self.config.ytdlp_path, args, self.config.metadata_timeout_secs)
                .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::from_tool_output(&stderr));
        }

        let mut video = parse_video_json(&output.stdout, Arc::clone(&self.config))?;
        if video.webpage_url.is_empty() {
            video.webpage_url = url.to_string();
        }
        Ok(Box::new(video))
    }
}

/// Video resolved through yt-dlp
#[derive(Debug)]
pub struct YtDlpVideo {
    title: String,
    webpage_url: String,
    streams: Vec<RawStream>,
    config: Arc<SourceConfig>,
}

impl YtDlpVideo {
    fn download_args(&self, id: &StreamId, output_dir: &Path, base_name: &str) -> Vec<String> {
        let template = output_dir.join(format!("{}.%(ext)s", base_name));
        let mut args = vec![
            "-f".to_string(),
            id.to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s",
                PROGRESS_MARKER
            ),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        args.extend(get_timeout_args(&self.config.network));
        args.extend(get_proxy_args(&self.config.network));
        args.push(self.webpage_url.clone());
        args
    }
}

#[async_trait]
impl ResolvedVideo for YtDlpVideo {
    fn title(&self) -> &str {
        &self.title
    }

    fn streams(&self) -> Vec<RawStream> {
        self.streams.clone()
    }

    async fn download(
        &self,
        id: &StreamId,
        output_dir: &Path,
        base_name: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<PathBuf, SourceError> {
        if !self.streams.iter().any(|s| &s.id == id) {
            return Err(SourceError::UnknownFormat(id.clone()));
        }

        let program = &self.config.ytdlp_path;
        let args = self.download_args(id, output_dir, base_name);
        debug!("[yt-dlp] {} {}", program.display(), args.join(" "));

        let mut child = TokioCommand::new(program)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Tool("Failed to capture stdout from yt-dlp".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SourceError::Tool("Failed to capture stderr from yt-dlp".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await?;
            Ok::<String, std::io::Error>(buf)
        });

        // Progress lines and the printed file path both arrive on stdout
        let mut lines = BufReader::new(stdout).lines();
        let mut final_path = None;
        while let Some(line) = lines.next_line().await? {
            if let Some((received, total)) = parse_progress_line(&line) {
                progress(received, total);
                continue;
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                debug!("[yt-dlp] {}", trimmed);
                final_path = Some(PathBuf::from(trimmed));
            }
        }

        let status = child.wait().await?;
        let stderr_output = match stderr_task.await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("[yt-dlp] Failed to read stderr: {}", e);
                String::new()
            }
            Err(e) => {
                warn!("[yt-dlp] stderr reader failed: {}", e);
                String::new()
            }
        };

        if !status.success() {
            return Err(SourceError::from_tool_output(&stderr_output));
        }

        final_path.ok_or_else(|| {
            SourceError::Parse("yt-dlp finished without reporting the output path".to_string())
        })
    }
}

/// Parse a progress-template line into `(downloaded, total)`
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let received = parse_byte_count(caps.get(1)?.as_str())?;
    let total = parse_byte_count(caps.get(2)?.as_str())
        .or_else(|| caps.get(3).and_then(|m| parse_byte_count(m.as_str())))
        .filter(|t| *t > 0);
    Some((received, total))
}

/// yt-dlp prints "NA" for missing fields and floats for estimates
fn parse_byte_count(field: &str) -> Option<u64> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64)
}

fn parse_video_json(stdout: &[u8], config: Arc<SourceConfig>) -> Result<YtDlpVideo, SourceError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| SourceError::Parse(format!("Invalid JSON: {}", e)))?;

    let formats = json["formats"]
        .as_array()
        .ok_or_else(|| SourceError::Parse("No formats array in JSON".to_string()))?;

    Ok(YtDlpVideo {
        title: json["title"].as_str().unwrap_or("").to_string(),
        webpage_url: json["webpage_url"].as_str().unwrap_or("").to_string(),
        streams: formats.iter().filter_map(parse_format).collect(),
        config,
    })
}

/// Map one yt-dlp format; storyboards and other trackless formats are skipped
fn parse_format(f: &Value) -> Option<RawStream> {
    let format_id = f["format_id"].as_str().filter(|id| !id.is_empty())?;
    let vcodec = f["vcodec"].as_str();
    let acodec = f["acodec"].as_str();
    let height = f["height"].as_u64().map(|h| h as u32);

    let has_video = match vcodec {
        Some(v) => v != "none",
        None => height.is_some(),
    };
    let has_audio = acodec.map_or(false, |a| a != "none");

    let ext = f["ext"].as_str().unwrap_or("mp4");
    let size_bytes = f["filesize"]
        .as_u64()
        .or_else(|| f["filesize_approx"].as_f64().map(|s| s as u64));

    if has_video {
        let quality = height.or_else(|| {
            f["format_note"]
                .as_str()
                .and_then(|note| NOTE_HEIGHT_RE.captures(note))
                .and_then(|caps| caps[1].parse().ok())
        });
        Some(RawStream {
            id: StreamId::from(format_id),
            kind: StreamKind::Video,
            container_type: format!("video/{}", ext),
            quality,
            progressive: has_audio,
            size_bytes,
        })
    } else if has_audio {
        let quality = f["abr"]
            .as_f64()
            .or_else(|| f["tbr"].as_f64())
            .map(|kbps| kbps.round() as u32);
        let container = if ext == "m4a" { "mp4" } else { ext };
        Some(RawStream {
            id: StreamId::from(format_id),
            kind: StreamKind::Audio,
            container_type: format!("audio/{}", container),
            quality,
            progressive: false,
            size_bytes,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JSON: &str = r#"{
        "id": "abcdefghijk",
        "title": "Demo: the video",
        "webpage_url": "https://www.youtube.com/watch?v=abcdefghijk",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2",
             "abr": 129.478, "filesize": 3400000},
            {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 160.1},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2",
             "height": 360, "filesize_approx": 12000000.0},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none",
             "height": 1080, "filesize": null},
            {"format_id": "hls-720", "ext": "mp4", "vcodec": "avc1", "acodec": "none",
             "height": null, "format_note": "720p60"}
        ]
    }"#;

    fn config() -> Arc<SourceConfig> {
        Arc::new(SourceConfig {
            ytdlp_path: PathBuf::from("yt-dlp"),
            network: NetworkConfig::default(),
            metadata_timeout_secs: 10,
        })
    }

    fn stream<'a>(video: &'a YtDlpVideo, id: &str) -> &'a RawStream {
        video.streams.iter().find(|s| s.id.as_str() == id).unwrap()
    }

    #[test]
    fn test_parse_video_json() {
        let video = parse_video_json(SAMPLE_JSON.as_bytes(), config()).unwrap();

        assert_eq!(video.title, "Demo: the video");
        assert_eq!(video.streams.len(), 5);
        assert!(video.streams.iter().all(|s| s.id.as_str() != "sb0"));

        let audio = stream(&video, "140");
        assert_eq!(audio.kind, StreamKind::Audio);
        assert_eq!(audio.container_type, "audio/mp4");
        assert_eq!(audio.quality, Some(129));
        assert_eq!(audio.size_bytes, Some(3_400_000));

        let progressive = stream(&video, "18");
        assert_eq!(progressive.kind, StreamKind::Video);
        assert!(progressive.progressive);
        assert_eq!(progressive.size_bytes, Some(12_000_000));

        let adaptive = stream(&video, "137");
        assert!(!adaptive.progressive);
        assert_eq!(adaptive.quality, Some(1080));
        assert_eq!(adaptive.size_bytes, None);

        assert_eq!(stream(&video, "hls-720").quality, Some(720));
        assert_eq!(stream(&video, "251").container_type, "audio/webm");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_video_json(b"<html>", config()),
            Err(SourceError::Parse(_))
        ));
        assert!(matches!(
            parse_video_json(br#"{"title": "x"}"#, config()),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(
            parse_progress_line("__stream_progress__ 1024 4096 NA"),
            Some((1024, Some(4096)))
        );
        assert_eq!(
            parse_progress_line("__stream_progress__ 1024 NA 8192.5"),
            Some((1024, Some(8193)))
        );
        assert_eq!(parse_progress_line("__stream_progress__ 10 NA NA"), Some((10, None)));
        assert_eq!(parse_progress_line("__stream_progress__ NA NA NA"), None);
        assert_eq!(parse_progress_line("/tmp/out/Demo.mp4"), None);
    }

    #[test]
    fn test_download_args() {
        let video = parse_video_json(SAMPLE_JSON.as_bytes(), config()).unwrap();
        let args = video.download_args(&StreamId::from("137"), Path::new("/tmp/out"), "Demo");

        assert_eq!(&args[..2], &["-f".to_string(), "137".to_string()]);
        assert!(args.contains(&"/tmp/out/Demo.%(ext)s".to_string()));
        assert!(args.contains(&"after_move:filepath".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abcdefghijk");
    }

    #[test]
    fn test_metadata_args_include_network_config() {
        let source = YtDlpSource::new(
            SourceConfig::new(PathBuf::from("/usr/bin/yt-dlp"))
                .with_proxy(Some("socks5://127.0.0.1:1080".to_string()))
                .with_socket_timeout(12)
                .with_metadata_timeout(5),
        );
        assert_eq!(source.config.metadata_timeout_secs, 5);
        let args = source.metadata_args("https://youtu.be/abcdefg");

        assert_eq!(args[0], "--dump-json");
        assert!(args.windows(2).any(|w| w == ["--proxy", "socks5://127.0.0.1:1080"]));
        assert!(args.windows(2).any(|w| w == ["--socket-timeout", "12"]));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abcdefg");
    }

    /// Shell script standing in for yt-dlp: `--dump-json` prints the sample
    /// metadata, anything else runs `download_body`
    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, download_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let json_path = dir.join("info.json");
        std::fs::write(&json_path, SAMPLE_JSON).unwrap();
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--dump-json\" ]; then\n  cat '{}'\n  exit 0\nfi\n{}\n",
            json_path.display(),
            download_body
        );
        let path = dir.join("yt-dlp");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_streams_progress_and_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        let saved = tmp.path().join("Demo.mp4");
        let body = format!(
            "echo '__stream_progress__ 0 NA NA'\n\
             echo '__stream_progress__ 512 1024 NA'\n\
             echo '[download] Destination: somewhere'\n\
             echo '__stream_progress__ 1024 1024 NA'\n\
             echo '{}'\n\
             exit 0",
            saved.display()
        );
        let source = YtDlpSource::new(SourceConfig::new(fake_ytdlp(tmp.path(), &body)));

        let video = source.resolve("https://youtu.be/abcdefghijk").await.unwrap();
        assert_eq!(video.title(), "Demo: the video");

        let seen = std::sync::Mutex::new(Vec::new());
        let path = video
            .download(&StreamId::from("18"), tmp.path(), "Demo", &|received: u64, total: Option<u64>| {
                seen.lock().unwrap().push((received, total))
            })
            .await
            .unwrap();

        assert_eq!(path, saved);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![(0, None), (512, Some(1024)), (1024, Some(1024))]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_download_is_classified_from_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let body = "echo '__stream_progress__ 10 100 NA'\n\
                    echo 'ERROR: [youtube] abcdefghijk: Private video' >&2\n\
                    exit 1";
        let source = YtDlpSource::new(SourceConfig::new(fake_ytdlp(tmp.path(), body)));
        let video = source.resolve("https://youtu.be/abcdefghijk").await.unwrap();

        let err = video
            .download(&StreamId::from("140"), tmp.path(), "Demo", &|_: u64, _: Option<u64>| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SourceError::Unavailable {
                reason: crate::downloader::diagnostics::Unavailability::PrivateVideo,
                ..
            }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_without_printed_path_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let source = YtDlpSource::new(SourceConfig::new(fake_ytdlp(
            tmp.path(),
            "echo '__stream_progress__ 10 NA NA'\nexit 0",
        )));
        let video = source.resolve("https://youtu.be/abcdefghijk").await.unwrap();

        let err = video
            .download(&StreamId::from("140"), tmp.path(), "Demo", &|_: u64, _: Option<u64>| {})
            .await
            .unwrap_err();

        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn test_unknown_format_is_rejected_before_spawning() {
        let video = parse_video_json(SAMPLE_JSON.as_bytes(), config()).unwrap();
        let err = video
            .download(&StreamId::from("999"), Path::new("/tmp"), "Demo", &|_: u64, _: Option<u64>| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnknownFormat(_)));
    }
}
