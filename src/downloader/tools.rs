use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tokio::process::Command as TokioCommand;

use tracing::debug;

const YTDLP_BINARY: &str = "yt-dlp";
const YTDLP_ENV: &str = "YTDLP_PATH";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: PathBuf,
    pub is_available: bool,
}

pub struct ToolManager;

impl ToolManager {
    /// Resolve the yt-dlp binary.
    ///
    /// Order: explicit path, `YTDLP_PATH`, well-known install locations,
    /// `which yt-dlp`, then the bare name (left for the OS to resolve).
    pub fn locate_ytdlp(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        if let Some(path) = std::env::var_os(YTDLP_ENV).filter(|p| !p.is_empty()) {
            debug!("[tools] {} override: {:?}", YTDLP_ENV, path);
            return PathBuf::from(path);
        }

        let common_paths = [
            format!("/opt/homebrew/bin/{}", YTDLP_BINARY), // Homebrew on Apple Silicon
            format!("/usr/local/bin/{}", YTDLP_BINARY),    // Homebrew on Intel Mac
            format!("/usr/bin/{}", YTDLP_BINARY),          // System installation
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return PathBuf::from(path);
            }
        }

        if let Ok(output) = Command::new("which").arg(YTDLP_BINARY).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        PathBuf::from(YTDLP_BINARY)
    }

    pub async fn version(path: &Path) -> Option<String> {
        match TokioCommand::new(path).arg("--version").output().await {
            Ok(output) if output.status.success() => {
                let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!out.is_empty()).then_some(out)
            }
            _ => None,
        }
    }

    pub async fn tool_info(path: &Path) -> ToolInfo {
        let version = Self::version(path).await;
        ToolInfo {
            name: YTDLP_BINARY.to_string(),
            is_available: version.is_some(),
            version,
            path: path.to_path_buf(),
        }
    }
}
