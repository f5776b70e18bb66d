// Orchestrator: load a video, expose its catalog, download one stream

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::errors::Error;
use super::format_selector::FormatSelector;
use super::models::{DownloaderState, ProgressEvent, StreamDescriptor, StreamId};
use super::traits::{ResolvedVideo, VideoSource};
use super::utils::{ensure_directory, is_probable_video_url, sanitize_filename, DEFAULT_MAX_FILENAME_LEN};

/// The currently loaded video, owned by exactly one [`Downloader`]
struct VideoHandle {
    source_url: String,
    video: Box<dyn ResolvedVideo>,
}

/// Stateful download orchestrator.
///
/// Every operation takes `&mut self`, so at most one `load` or `download`
/// is in flight per instance. The orchestrator never spawns threads itself;
/// move it into a worker task to keep an interactive loop responsive.
pub struct Downloader {
    source: Arc<dyn VideoSource>,
    handle: Option<VideoHandle>,
    state: DownloaderState,
    max_filename_len: usize,
}

impl Downloader {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self {
            source,
            handle: None,
            state: DownloaderState::Idle,
            max_filename_len: DEFAULT_MAX_FILENAME_LEN,
        }
    }

    pub fn with_max_filename_len(mut self, max_len: usize) -> Self {
        self.max_filename_len = max_len;
        self
    }

    pub fn state(&self) -> DownloaderState {
        self.state
    }

    /// URL of the loaded video
    pub fn source_url(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.source_url.as_str())
    }

    pub fn title(&self) -> Result<&str, Error> {
        Ok(self.loaded()?.video.title())
    }

    /// Resolve `url` and make it the current video.
    ///
    /// Any previously loaded video is dropped first, so descriptors obtained
    /// before this call are stale whatever the outcome.
    pub async fn load(&mut self, url: &str) -> Result<(), Error> {
        let url = url.trim();
        if !is_probable_video_url(url) {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        self.handle = None;
        self.state = DownloaderState::Loading;
        info!("[Downloader] Loading {} via {}", url, self.source.name());

        match self.source.resolve(url).await {
            Ok(video) => {
                info!(
                    "[Downloader] Loaded '{}' ({} streams)",
                    video.title(),
                    video.streams().len()
                );
                self.handle = Some(VideoHandle {
                    source_url: url.to_string(),
                    video,
                });
                self.state = DownloaderState::Loaded;
                Ok(())
            }
            Err(e) => {
                warn!("[Downloader] {} failed to resolve {}: {}", self.source.name(), url, e);
                self.state = DownloaderState::Idle;
                Err(Error::Resolution(e))
            }
        }
    }

    /// Ordered catalog of the loaded video, rebuilt on every call
    pub fn list_streams(&self) -> Result<Vec<StreamDescriptor>, Error> {
        let handle = self.loaded()?;
        Ok(FormatSelector::build_catalog(&handle.video.streams()))
    }

    /// Download one stream into `output_dir`, returning the absolute file path.
    ///
    /// `on_progress` receives [`ProgressEvent`]s; a `total_bytes` of 0 means
    /// the size is unknown. A file partially written before a failure is left
    /// in place.
    pub async fn download<F>(
        &mut self,
        stream_id: &StreamId,
        output_dir: &Path,
        on_progress: F,
    ) -> Result<PathBuf, Error>
    where
        F: Fn(ProgressEvent) + Send + Sync,
    {
        let handle = self.handle.as_ref().ok_or(Error::NotLoaded)?;

        let known = FormatSelector::build_catalog(&handle.video.streams())
            .iter()
            .any(|d| d.id() == stream_id);
        if !known {
            return Err(Error::UnknownStream(stream_id.clone()));
        }

        let base_name = sanitize_filename(handle.video.title(), self.max_filename_len);
        self.state = DownloaderState::Downloading;
        debug!(
            "[Downloader] Downloading stream {} of {} as '{}'",
            stream_id, handle.source_url, base_name
        );

        let tracker = ProgressTracker::new(on_progress);
        let result = match ensure_directory(output_dir).await {
            Ok(dir) => handle
                .video
                .download(stream_id, &dir, &base_name, &|received: u64, total: Option<u64>| {
                    tracker.report(received, total)
                })
                .await
                .map_err(Error::Download),
            Err(e) => Err(Error::Download(e.into())),
        };

        match result {
            Ok(path) => {
                tracker.finish();
                let path = std::path::absolute(&path).unwrap_or(path);
                info!("[Downloader] ✓ Saved {}", path.display());
                self.state = DownloaderState::Completed;
                Ok(path)
            }
            Err(e) => {
                warn!("[Downloader] ✗ Stream {} failed: {}", stream_id, e);
                self.state = DownloaderState::Failed;
                Err(e)
            }
        }
    }

    fn loaded(&self) -> Result<&VideoHandle, Error> {
        self.handle.as_ref().ok_or(Error::NotLoaded)
    }
}

/// Adapts raw source callbacks into well-formed [`ProgressEvent`]s.
///
/// Unknown totals become the `0` sentinel and regressions are dropped while
/// the total is known. A total smaller than the bytes received is raised to
/// match. `finish` emits the closing `received == total` event if the
/// source never did.
struct ProgressTracker<F> {
    callback: F,
    last_received: AtomicU64,
    last_total: AtomicU64,
}

impl<F> ProgressTracker<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn new(callback: F) -> Self {
        Self {
            callback,
            last_received: AtomicU64::new(0),
            last_total: AtomicU64::new(0),
        }
    }

    fn report(&self, received: u64, total: Option<u64>) {
        // Estimated totals can end up below what actually arrived
        let total = total.map(|t| t.max(received));
        let event = ProgressEvent::new(received, total);
        if event.total_known() && received < self.last_received.load(Ordering::Relaxed) {
            return;
        }

        self.last_received.store(received, Ordering::Relaxed);
        self.last_total.store(event.total_bytes, Ordering::Relaxed);
        (self.callback)(event);
    }

    fn finish(&self) {
        let total = self.last_total.load(Ordering::Relaxed);
        if total > 0 && self.last_received.load(Ordering::Relaxed) < total {
            self.last_received.store(total, Ordering::Relaxed);
            (self.callback)(ProgressEvent::new(total, Some(total)));
        }
    }
}
