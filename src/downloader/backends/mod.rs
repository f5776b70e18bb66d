// Downloader backends

pub mod ytdlp;

pub use ytdlp::{SourceConfig, YtDlpSource};
