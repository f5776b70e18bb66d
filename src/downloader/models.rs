// Common data models for downloader

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque identifier used to request one stream from the source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<u32> for StreamId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// Stream record as reported by a video source, before catalog ordering
#[derive(Debug, Clone, PartialEq)]
pub struct RawStream {
    pub id: StreamId,
    pub kind: StreamKind,
    /// Declared container type (e.g. "video/mp4")
    pub container_type: String,
    /// Pixel height for video, kbps for audio
    pub quality: Option<u32>,
    /// Video with muxed audio
    pub progressive: bool,
    pub size_bytes: Option<u64>,
}

/// One entry of the catalog shown to the user.
///
/// Fields are read-only so the display label always matches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    id: StreamId,
    kind: StreamKind,
    container_type: String,
    quality_label: String,
    is_progressive: bool,
    size_bytes: Option<u64>,
}

impl StreamDescriptor {
    pub fn new(
        id: StreamId,
        kind: StreamKind,
        container_type: impl Into<String>,
        quality_label: impl Into<String>,
        is_progressive: bool,
        size_bytes: Option<u64>,
    ) -> Self {
        Self {
            id,
            kind,
            container_type: container_type.into(),
            quality_label: quality_label.into(),
            // Audio streams never carry video, so they are never progressive
            is_progressive: is_progressive && kind == StreamKind::Video,
            size_bytes,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn container_type(&self) -> &str {
        &self.container_type
    }

    pub fn quality_label(&self) -> &str {
        &self.quality_label
    }

    pub fn is_progressive(&self) -> bool {
        self.is_progressive
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Human-readable label, e.g. "VIDEO | 1080p | adaptive | video/mp4"
    pub fn display_label(&self) -> String {
        match self.kind {
            StreamKind::Video => format!(
                "VIDEO | {} | {} | {}",
                self.quality_label,
                if self.is_progressive { "progressive" } else { "adaptive" },
                self.container_type
            ),
            StreamKind::Audio => {
                format!("AUDIO | {} | {}", self.quality_label, self.container_type)
            }
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_label())
    }
}

/// Download progress information.
///
/// `total_bytes == 0` means the total is unknown, not that the transfer is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub bytes_received: u64,
    pub total_bytes: u64,
}

impl ProgressEvent {
    pub fn new(bytes_received: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_received,
            total_bytes: total_bytes.unwrap_or(0),
        }
    }

    pub fn total_known(&self) -> bool {
        self.total_bytes > 0
    }

    /// Percentage in 0..=100, `None` when the total is unknown
    pub fn percent(&self) -> Option<f32> {
        if !self.total_known() {
            return None;
        }
        let ratio = self.bytes_received as f64 / self.total_bytes as f64;
        Some((ratio * 100.0).min(100.0) as f32)
    }

    pub fn is_complete(&self) -> bool {
        self.total_known() && self.bytes_received >= self.total_bytes
    }
}

/// Orchestrator lifecycle.
///
/// `Completed` and `Failed` are sticky: they report how the last download
/// ended while the handle stays loaded, so both act like `Loaded` for the
/// next `download`. Check [`DownloaderState::has_video`] rather than
/// comparing against `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DownloaderState {
    Idle,
    Loading,
    Loaded,
    Downloading,
    Completed,
    Failed,
}

impl DownloaderState {
    /// A video handle is available for listing and downloading
    pub fn has_video(&self) -> bool {
        matches!(self, Self::Loaded | Self::Completed | Self::Failed)
    }
}

/// Network configuration for backends
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// SOCKS5/HTTP proxy URL (e.g., "socks5://127.0.0.1:1080")
    pub proxy: Option<String>,

    /// Socket timeout in seconds
    pub timeout: Option<u32>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Some(30),
        }
    }
}

/// Default output directory: `<Downloads>/stream-downloader`, else `./downloads`
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .map(|d| d.join("stream-downloader"))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(quality: &str, progressive: bool) -> StreamDescriptor {
        StreamDescriptor::new(
            StreamId::from(18u32),
            StreamKind::Video,
            "video/mp4",
            quality,
            progressive,
            None,
        )
    }

    #[test]
    fn test_video_display_label() {
        assert_eq!(
            video("720p", true).display_label(),
            "VIDEO | 720p | progressive | video/mp4"
        );
        assert_eq!(
            video("1080p", false).display_label(),
            "VIDEO | 1080p | adaptive | video/mp4"
        );
    }

    #[test]
    fn test_audio_display_label_and_progressive_flag() {
        let audio = StreamDescriptor::new(
            StreamId::from("140"),
            StreamKind::Audio,
            "audio/mp4",
            "128kbps",
            true,
            Some(1024),
        );
        assert!(!audio.is_progressive());
        assert_eq!(audio.display_label(), "AUDIO | 128kbps | audio/mp4");
    }

    #[test]
    fn test_equal_fields_give_equal_labels() {
        assert_eq!(video("480p", false).display_label(), video("480p", false).display_label());
    }

    #[test]
    fn test_unknown_total_has_no_percent() {
        let event = ProgressEvent::new(5_000, None);
        assert_eq!(event.total_bytes, 0);
        assert_eq!(event.percent(), None);
        assert!(!event.is_complete());
    }

    #[test]
    fn test_percent_and_completion() {
        let half = ProgressEvent::new(50, Some(200));
        assert_eq!(half.percent(), Some(25.0));
        assert!(ProgressEvent::new(200, Some(200)).is_complete());
    }
}
