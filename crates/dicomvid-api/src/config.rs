//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;

use dicomvid_models::{ConversionOptions, NormalizationStrategy, QualityTier};
use tracing::warn;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size; base64 inflates DICOM payloads by a third
    pub max_body_size: usize,
    /// Parent directory for per-request scratch space, system temp when unset
    pub work_dir: Option<PathBuf>,
    /// Conversion options applied when a request does not override them
    pub defaults: ConversionOptions,
    /// FFmpeg timeout in seconds, none when unset
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 256 * 1024 * 1024, // 256MB
            work_dir: None,
            defaults: ConversionOptions::default(),
            ffmpeg_timeout_secs: None,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let quality = match var("DEFAULT_QUALITY") {
            Some(value) => QualityTier::from_str(&value).unwrap_or_else(|e| {
                warn!("Ignoring DEFAULT_QUALITY: {}", e);
                defaults.defaults.quality
            }),
            None => defaults.defaults.quality,
        };

        let normalization = match var("DEFAULT_NORMALIZATION").as_deref().map(str::trim) {
            Some("set_wide") => NormalizationStrategy::SetWide,
            Some("per_frame") | None => NormalizationStrategy::PerFrame,
            Some(other) => {
                warn!("Ignoring DEFAULT_NORMALIZATION: unknown strategy {}", other);
                NormalizationStrategy::PerFrame
            }
        };

        Self {
            host: var("API_HOST").unwrap_or(defaults.host),
            port: var("API_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: var("MAX_BODY_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            work_dir: var("WORK_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            defaults: ConversionOptions {
                framerate: var("DEFAULT_FRAMERATE")
                    .and_then(|s| s.parse().ok())
                    .filter(|&fps: &u32| fps > 0)
                    .unwrap_or(defaults.defaults.framerate),
                quality,
                bitrate: var("DEFAULT_BITRATE")
                    .and_then(|s| s.parse().ok())
                    .filter(|&b: &u64| b > 0),
                normalization,
                validate: var("VALIDATE_OUTPUT")
                    .map(|v| v != "false" && v != "0")
                    .unwrap_or(true),
            },
            ffmpeg_timeout_secs: var("FFMPEG_TIMEOUT_SECS").and_then(|s| s.parse().ok()),
            environment: var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
