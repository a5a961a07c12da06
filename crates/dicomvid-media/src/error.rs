//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::dicom::DicomError;
use dicomvid_models::encoding::ProfileError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during conversion.
///
/// `Format`, `Normalization` and `Encoding` abort a conversion. Decode-check
/// findings are never errors; see [`crate::validate::ValidationWarning`].
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("Invalid DICOM input: {0}")]
    Format(#[from] DicomError),

    #[error("Frame normalization failed: {0}")]
    Normalization(String),

    #[error("Frame staging failed: {0}")]
    Staging(String),

    #[error("{message} (exit code {}): {}", exit_code_label(.exit_code), .stderr.trim())]
    Encoding {
        message: String,
        stderr: String,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Invalid encoding profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl MediaError {
    /// Create a normalization failure error.
    pub fn normalization(message: impl Into<String>) -> Self {
        Self::Normalization(message.into())
    }

    /// Create a staging failure error.
    pub fn staging(message: impl Into<String>) -> Self {
        Self::Staging(message.into())
    }

    /// Create an encoder failure error.
    pub fn encoding_failed(
        message: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::Encoding {
            message: message.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error came from the input container.
    pub fn is_format_error(&self) -> bool {
        matches!(self, MediaError::Format(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_surfaces_stderr() {
        let err = MediaError::encoding_failed(
            "FFmpeg exited with non-zero status",
            "Unknown encoder 'libx264'\n",
            Some(1),
        );
        assert_eq!(
            err.to_string(),
            "FFmpeg exited with non-zero status (exit code 1): Unknown encoder 'libx264'"
        );

        let killed = MediaError::encoding_failed("FFmpeg exited with non-zero status", "", None);
        assert!(killed.to_string().contains("exit code signal"));
    }

    #[test]
    fn test_format_error_from_dicom() {
        let err: MediaError = DicomError::MissingAttribute("NumberOfFrames").into();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("NumberOfFrames"));
    }
}
