// FormatSelector - catalog ordering
//
// Converts raw streams from a VideoSource into the ordered catalog:
// - Video streams first, highest resolution first
// - Audio-only streams after, highest bitrate first
// - Unknown quality sorts last within its kind
// - Ties keep the order the source reported

use std::cmp::Reverse;

use super::models::{RawStream, StreamDescriptor, StreamKind};

const UNKNOWN_QUALITY: &str = "unknown";

/// Catalog builder
pub struct FormatSelector;

impl FormatSelector {
    /// Build the ordered catalog from raw streams
    pub fn build_catalog(streams: &[RawStream]) -> Vec<StreamDescriptor> {
        let mut video: Vec<&RawStream> = streams
            .iter()
            .filter(|s| s.kind == StreamKind::Video)
            .collect();
        let mut audio: Vec<&RawStream> = streams
            .iter()
            .filter(|s| s.kind == StreamKind::Audio)
            .collect();

        // `sort_by_key` is stable; Reverse(None) sorts after every Reverse(Some(_))
        video.sort_by_key(|s| Reverse(s.quality));
        audio.sort_by_key(|s| Reverse(s.quality));

        video
            .into_iter()
            .chain(audio)
            .map(Self::describe)
            .collect()
    }

    fn describe(stream: &RawStream) -> StreamDescriptor {
        StreamDescriptor::new(
            stream.id.clone(),
            stream.kind,
            stream.container_type.clone(),
            Self::quality_label(stream.kind, stream.quality),
            stream.progressive,
            stream.size_bytes,
        )
    }

    /// "1080p" for video, "160kbps" for audio
    pub fn quality_label(kind: StreamKind, quality: Option<u32>) -> String {
        match (kind, quality) {
            (StreamKind::Video, Some(height)) => format!("{}p", height),
            (StreamKind::Audio, Some(kbps)) => format!("{}kbps", kbps),
            (_, None) => UNKNOWN_QUALITY.to_string(),
        }
    }
}
