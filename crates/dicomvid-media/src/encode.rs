//! H.264 encoding of a staged frame sequence.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::stage::StagingArea;
use dicomvid_models::EncodingProfile;

/// Outcome of a successful encode.
#[derive(Debug, Clone, Serialize)]
pub struct EncodingResult {
    /// Encoded file
    pub output: PathBuf,
    /// Number of frames fed to the encoder
    pub frames: usize,
    pub exit_code: Option<i32>,
    /// Anything the encoder printed at `-v error`, usually empty
    pub diagnostics: String,
    /// Size of the encoded file in bytes
    pub size: u64,
    /// Encoder wall time in milliseconds
    pub duration_ms: u64,
}

/// Encodes staged frames with the FFmpeg CLI.
#[derive(Debug, Clone)]
pub struct VideoEncoder {
    runner: FfmpegRunner,
}

impl VideoEncoder {
    /// Create an encoder for the given FFmpeg binary.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            runner: FfmpegRunner::new(ffmpeg),
        }
    }

    /// Abort encodes running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    /// Build the FFmpeg invocation for a staged sequence.
    pub fn build_command(
        &self,
        staging: &StagingArea,
        profile: &EncodingProfile,
        output: &Path,
    ) -> FfmpegCommand {
        FfmpegCommand::new(staging.input_pattern(), output)
            .input_args(profile.input_args())
            .output_args(profile.to_ffmpeg_args())
    }

    /// Encode every staged frame into `output`.
    pub async fn encode(
        &self,
        staging: &StagingArea,
        profile: &EncodingProfile,
        output: impl AsRef<Path>,
    ) -> MediaResult<EncodingResult> {
        let output = output.as_ref();
        profile.validate()?;

        if staging.is_empty() {
            return Err(MediaError::encoding_failed(
                "No frames were staged for encoding",
                "",
                None,
            ));
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = self.build_command(staging, profile, output);
        info!(
            frames = staging.frame_count(),
            framerate = profile.framerate,
            rate_control = ?profile.rate_control,
            "Encoding {}",
            output.display()
        );

        let start = Instant::now();
        let result = self.runner.run(&cmd).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !result.success {
            warn!(
                exit_code = ?result.exit_code,
                "FFmpeg encode failed: {}",
                result.stderr.trim()
            );
            return Err(MediaError::encoding_failed(
                "FFmpeg exited with non-zero status",
                result.stderr,
                result.exit_code,
            ));
        }

        let size = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(_) => return Err(MediaError::FileNotFound(output.to_path_buf())),
        };
        if !result.stderr.trim().is_empty() {
            debug!("FFmpeg diagnostics: {}", result.stderr.trim());
        }
        info!(size, duration_ms, "Encoded {}", output.display());

        Ok(EncodingResult {
            output: output.to_path_buf(),
            frames: staging.frame_count(),
            exit_code: result.exit_code,
            diagnostics: result.stderr,
            size,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::RawFrame;
    use crate::normalize::FrameNormalizer;
    use crate::stage::FrameStager;
    use tempfile::TempDir;

    fn staged(parent: &Path, frames: usize) -> StagingArea {
        let normalizer = FrameNormalizer::per_frame();
        FrameStager::in_dir(parent)
            .stage((0..frames).map(|i| {
                normalizer.normalize(&RawFrame::new(i, 4, 4, 1, (0..16).map(|v| v + i as i64).collect()))
            }))
            .unwrap()
    }

    #[test]
    fn test_build_command_quality() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 1);
        let encoder = VideoEncoder::new("ffmpeg");
        let args = encoder
            .build_command(&area, &EncodingProfile::default(), Path::new("out.mp4"))
            .build_args();

        let pattern = area.input_pattern().to_string_lossy().to_string();
        let expected: Vec<String> = [
            "-y", "-v", "error", "-framerate", "30", "-i", pattern.as_str(), "-c:v", "libx264", "-preset",
            "slow", "-crf", "23", "-pix_fmt", "yuv420p", "-color_primaries", "bt709",
            "-color_trc", "bt709", "-colorspace", "bt709", "-an", "-movflags", "+faststart",
            "out.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_build_command_bitrate() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 1);
        let profile = EncodingProfile::default()
            .with_framerate(15)
            .with_bitrate(2_000_000);
        let args = VideoEncoder::new("ffmpeg")
            .build_command(&area, &profile, Path::new("out.mp4"))
            .build_args();

        let window = |flag: &str| {
            let i = args.iter().position(|a| a == flag).unwrap();
            args[i + 1].clone()
        };
        assert_eq!(window("-framerate"), "15");
        assert_eq!(window("-b:v"), "2000000");
        assert_eq!(window("-maxrate"), "3000000");
        assert_eq!(window("-bufsize"), "4000000");
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[tokio::test]
    async fn test_rejects_empty_staging() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::create(Some(dir.path())).unwrap();
        let err = VideoEncoder::new("/nonexistent/ffmpeg")
            .encode(&area, &EncodingProfile::default(), dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Encoding { .. }));
    }

    #[tokio::test]
    async fn test_rejects_invalid_profile() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 1);
        let err = VideoEncoder::new("/nonexistent/ffmpeg")
            .encode(
                &area,
                &EncodingProfile::default().with_framerate(0),
                dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidProfile(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_diagnostics() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 2);
        let fake = crate::tools::test_support::fake_ffmpeg(
            dir.path(),
            "echo 'Unknown encoder libx264' >&2; exit 1",
        );
        let err = VideoEncoder::new(fake)
            .encode(&area, &EncodingProfile::default(), dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        match err {
            MediaError::Encoding { stderr, exit_code, .. } => {
                assert_eq!(exit_code, Some(1));
                assert!(stderr.contains("Unknown encoder"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_creates_output_parent() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 3);
        let fake = crate::tools::test_support::fake_ffmpeg(dir.path(), "printf mp4 > \"$last\"");
        let output = dir.path().join("nested").join("deeper").join("out.mp4");

        let result = tokio_test::assert_ok!(
            VideoEncoder::new(fake)
                .encode(&area, &EncodingProfile::default(), &output)
                .await
        );
        assert_eq!(result.output, output);
        assert_eq!(result.frames, 3);
        assert_eq!(result.size, 3);
        assert_eq!(result.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output_is_error() {
        let dir = TempDir::new().unwrap();
        let area = staged(dir.path(), 1);
        let fake = crate::tools::test_support::fake_ffmpeg(dir.path(), "exit 0");
        let err = VideoEncoder::new(fake)
            .encode(&area, &EncodingProfile::default(), dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
