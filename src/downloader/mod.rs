// Downloader module - URL validation, catalog, orchestration and backends

pub mod backends;
pub mod diagnostics;
pub mod errors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{Error, SourceError};
pub use format_selector::FormatSelector;
pub use models::{DownloaderState, ProgressEvent, RawStream, StreamDescriptor, StreamId, StreamKind};
pub use orchestrator::Downloader;
pub use traits::{ProgressFn, ResolvedVideo, VideoSource};
pub use utils::{is_probable_video_url, sanitize_filename};
