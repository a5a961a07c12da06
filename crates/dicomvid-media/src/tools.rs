//! External tool resolution.
//!
//! Binary locations are resolved once by the application and handed to the
//! encoder and validator; nothing in the pipeline searches `PATH` itself.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Environment variable overriding the FFmpeg binary.
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";
/// Environment variable overriding the FFprobe binary.
pub const FFPROBE_PATH_ENV: &str = "FFPROBE_PATH";

/// Locations of the external binaries used by a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    /// Used to report frame count and geometry of the output when present
    pub ffprobe: Option<PathBuf>,
}

impl ToolPaths {
    /// Explicit FFmpeg location without FFprobe.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: None,
        }
    }

    pub fn with_ffprobe(mut self, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffprobe = Some(ffprobe.into());
        self
    }

    /// Resolve from `FFMPEG_PATH` / `FFPROBE_PATH`, falling back to `PATH`.
    pub fn resolve() -> MediaResult<Self> {
        Self::resolve_with(|key| std::env::var(key).ok(), |name| which::which(name).ok())
    }

    /// Resolve with injectable environment and search lookups.
    pub fn resolve_with(
        env: impl Fn(&str) -> Option<String>,
        search: impl Fn(&str) -> Option<PathBuf>,
    ) -> MediaResult<Self> {
        let ffmpeg = match non_empty(env(FFMPEG_PATH_ENV)) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(MediaError::FfmpegNotFound(format!(
                        "{FFMPEG_PATH_ENV}={} is not a file",
                        path.display()
                    )));
                }
                path
            }
            None => search("ffmpeg")
                .ok_or_else(|| MediaError::FfmpegNotFound("ffmpeg is not in PATH".to_string()))?,
        };

        let ffprobe = match non_empty(env(FFPROBE_PATH_ENV)) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(MediaError::FfprobeNotFound(format!(
                        "{FFPROBE_PATH_ENV}={} is not a file",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => search("ffprobe").or_else(|| sibling(&ffmpeg, "ffprobe")),
        };

        match &ffprobe {
            Some(path) => debug!("Using ffprobe at {}", path.display()),
            None => debug!("ffprobe not found; output probing disabled"),
        }
        info!("Using ffmpeg at {}", ffmpeg.display());

        Ok(Self { ffmpeg, ffprobe })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `name` next to `binary`, keeping its extension (e.g. `.exe`).
fn sibling(binary: &Path, name: &str) -> Option<PathBuf> {
    let mut candidate = binary.with_file_name(name);
    if let Some(ext) = binary.extension() {
        candidate.set_extension(ext);
    }
    candidate.is_file().then_some(candidate)
}
