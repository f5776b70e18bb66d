// Video source trait definitions

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::errors::SourceError;
use super::models::{RawStream, StreamId};

/// Raw progress callback: `(bytes_received_so_far, total_bytes_if_known)`.
///
/// May be invoked from a worker context, hence `Send + Sync`.
pub type ProgressFn<'a> = dyn Fn(u64, Option<u64>) + Send + Sync + 'a;

/// Trait for video-resolution backends
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Fetch metadata for a URL
    async fn resolve(&self, url: &str) -> Result<Box<dyn ResolvedVideo>, SourceError>;
}

/// A video whose metadata has been fetched
#[async_trait]
pub trait ResolvedVideo: Send + Sync {
    fn title(&self) -> &str;

    /// All streams, in the order the backend reports them
    fn streams(&self) -> Vec<RawStream>;

    /// Save one stream as `<output_dir>/<base_name>.<ext>` and return the path
    async fn download(
        &self,
        id: &StreamId,
        output_dir: &Path,
        base_name: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<PathBuf, SourceError>;
}
