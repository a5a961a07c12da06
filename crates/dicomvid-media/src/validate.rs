//! Decode check of an encoded file.
//!
//! The produced file is fully decoded to a null sink. Whatever FFmpeg reports
//! is returned as advisory warnings; validation never fails a conversion.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};

/// One decode-check finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationWarning {
    /// Exit code of the check, `None` if it never ran or was signalled
    pub exit_code: Option<i32>,
    pub message: String,
}

/// Result of decoding an output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub output: PathBuf,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// No diagnostics were reported.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Warning messages in report order.
    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.message.clone()).collect()
    }
}

/// Decodes encoded files to check they are readable.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    runner: FfmpegRunner,
}

impl OutputValidator {
    /// Create a validator for the given FFmpeg binary.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            runner: FfmpegRunner::new(ffmpeg),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.runner = self.runner.with_timeout(secs);
        self
    }

    /// `ffmpeg -v error -i <path> -f null -`
    pub fn build_command(&self, path: &Path) -> FfmpegCommand {
        FfmpegCommand::new(path, "-").overwrite(false).format("null")
    }

    /// Decode `path` and collect diagnostics.
    pub async fn validate(&self, path: impl AsRef<Path>) -> ValidationReport {
        let path = path.as_ref();
        let mut warnings = Vec::new();

        match self.runner.run(&self.build_command(path)).await {
            Ok(output) => {
                let stderr = output.stderr.trim();
                if !output.success {
                    warnings.push(ValidationWarning {
                        exit_code: output.exit_code,
                        message: if stderr.is_empty() {
                            "decode check exited with non-zero status".to_string()
                        } else {
                            stderr.to_string()
                        },
                    });
                } else if !stderr.is_empty() {
                    warnings.push(ValidationWarning {
                        exit_code: output.exit_code,
                        message: stderr.to_string(),
                    });
                }
            }
            Err(e) => warnings.push(ValidationWarning {
                exit_code: None,
                message: format!("decode check could not run: {e}"),
            }),
        }

        if warnings.is_empty() {
            info!("Decode check passed for {}", path.display());
        } else {
            for w in &warnings {
                warn!(exit_code = ?w.exit_code, "Decode check of {}: {}", path.display(), w.message);
            }
        }

        ValidationReport {
            output: path.to_path_buf(),
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command() {
        let args = OutputValidator::new("ffmpeg")
            .build_command(Path::new("/out/video.mp4"))
            .build_args();
        assert_eq!(args, vec!["-v", "error", "-i", "/out/video.mp4", "-f", "null", "-"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_warning() {
        let report = OutputValidator::new("/nonexistent/dicomvid/ffmpeg")
            .validate("/tmp/out.mp4")
            .await;
        assert!(!report.is_clean());
        assert_eq!(report.warnings[0].exit_code, None);
        assert!(report.warnings[0].message.starts_with("decode check could not run"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_decode() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake = crate::tools::test_support::fake_ffmpeg(dir.path(), "exit 0");
        let report = OutputValidator::new(fake).validate(dir.path().join("out.mp4")).await;
        assert!(report.is_clean());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_on_success_is_warning() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake = crate::tools::test_support::fake_ffmpeg(
            dir.path(),
            "echo 'corrupt macroblock' >&2; exit 0",
        );
        let report = OutputValidator::new(fake).validate(dir.path().join("out.mp4")).await;
        assert_eq!(
            report.warnings,
            vec![ValidationWarning {
                exit_code: Some(0),
                message: "corrupt macroblock".to_string()
            }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_warning() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake = crate::tools::test_support::fake_ffmpeg(dir.path(), "exit 1");
        let report = OutputValidator::new(fake).validate(dir.path().join("out.mp4")).await;
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].exit_code, Some(1));
        assert_eq!(report.messages(), vec!["decode check exited with non-zero status"]);
    }
}
