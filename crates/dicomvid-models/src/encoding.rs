//! Video encoding profile.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "slow";
/// Default input frame rate
pub const DEFAULT_FRAMERATE: u32 = 30;
/// Output pixel format; 4:2:0 chroma requires even frame dimensions
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Colour primaries, transfer and matrix tag
pub const BT709: &str = "bt709";

/// Ratio of max-rate to target bitrate when only a target is given.
const MAX_RATE_FACTOR: f64 = 1.5;
/// Ratio of rate-control buffer size to target bitrate.
const BUFFER_SIZE_FACTOR: u64 = 2;

/// Three-tier quality profile mapped onto a CRF value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Normal,
    High,
}

impl QualityTier {
    /// Constant rate factor for this tier (lower is higher quality).
    pub fn crf(&self) -> u8 {
        match self {
            QualityTier::Low => 28,
            QualityTier::Normal => 23,
            QualityTier::High => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Normal => "normal",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "normal" => Ok(QualityTier::Normal),
            "high" => Ok(QualityTier::High),
            other => Err(ProfileError::UnknownQuality(other.to_string())),
        }
    }
}

/// How the encoder controls output size and quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateControl {
    /// Constant rate factor chosen from a quality tier.
    Quality { tier: QualityTier },
    /// Explicit bitrate triple, all values in bits per second.
    Bitrate {
        target: u64,
        max_rate: u64,
        buffer_size: u64,
    },
}

impl RateControl {
    /// Rate control for a quality tier.
    pub fn quality(tier: QualityTier) -> Self {
        RateControl::Quality { tier }
    }

    /// Bitrate rate control, deriving max-rate (1.5x) and buffer size (2x)
    /// from the target.
    pub fn bitrate(target: u64) -> Self {
        RateControl::Bitrate {
            target,
            max_rate: (target as f64 * MAX_RATE_FACTOR).round() as u64,
            buffer_size: target.saturating_mul(BUFFER_SIZE_FACTOR),
        }
    }

    fn to_ffmpeg_args(self) -> Vec<String> {
        match self {
            RateControl::Quality { tier } => vec!["-crf".to_string(), tier.crf().to_string()],
            RateControl::Bitrate {
                target,
                max_rate,
                buffer_size,
            } => vec![
                "-b:v".to_string(),
                target.to_string(),
                "-maxrate".to_string(),
                max_rate.to_string(),
                "-bufsize".to_string(),
                buffer_size.to_string(),
            ],
        }
    }
}

impl Default for RateControl {
    fn default() -> Self {
        RateControl::quality(QualityTier::default())
    }
}

/// Colour description written into the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColorTags {
    pub primaries: String,
    pub transfer: String,
    pub matrix: String,
}

impl Default for ColorTags {
    fn default() -> Self {
        Self {
            primaries: BT709.to_string(),
            transfer: BT709.to_string(),
            matrix: BT709.to_string(),
        }
    }
}

/// Errors from building or parsing an encoding profile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("Unknown quality tier: {0} (expected low, normal or high)")]
    UnknownQuality(String),

    #[error("Frame rate must be greater than 0")]
    ZeroFramerate,

    #[error("Bitrate must be greater than 0")]
    ZeroBitrate,
}

/// Video encoding profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingProfile {
    /// Input frame rate of the staged image sequence
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Quality tier or explicit bitrate
    #[serde(default)]
    pub rate_control: RateControl,

    /// Video codec
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Output pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Colour primaries/transfer/matrix tags
    #[serde(default)]
    pub color: ColorTags,
}

fn default_framerate() -> u32 {
    DEFAULT_FRAMERATE
}
fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            framerate: DEFAULT_FRAMERATE,
            rate_control: RateControl::default(),
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            pixel_format: DEFAULT_PIXEL_FORMAT.to_string(),
            color: ColorTags::default(),
        }
    }
}

impl EncodingProfile {
    /// Create a profile with default settings (30 fps, normal quality).
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new profile with updated frame rate.
    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate;
        self
    }

    /// Returns a new profile using a quality tier.
    pub fn with_quality(mut self, tier: QualityTier) -> Self {
        self.rate_control = RateControl::quality(tier);
        self
    }

    /// Returns a new profile using an explicit target bitrate.
    pub fn with_bitrate(mut self, target: u64) -> Self {
        self.rate_control = RateControl::bitrate(target);
        self
    }

    /// Check the profile can drive an encoder.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.framerate == 0 {
            return Err(ProfileError::ZeroFramerate);
        }
        if let RateControl::Bitrate { target: 0, .. } = self.rate_control {
            return Err(ProfileError::ZeroBitrate);
        }
        Ok(())
    }

    /// Arguments placed before the input.
    pub fn input_args(&self) -> Vec<String> {
        vec!["-framerate".to_string(), self.framerate.to_string()]
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        args.extend(self.rate_control.to_ffmpeg_args());

        args.extend_from_slice(&[
            "-pix_fmt".to_string(),
            self.pixel_format.clone(),
            "-color_primaries".to_string(),
            self.color.primaries.clone(),
            "-color_trc".to_string(),
            self.color.transfer.clone(),
            "-colorspace".to_string(),
            self.color.matrix.clone(),
        ]);

        // Image sequences carry no audio
        args.push("-an".to_string());
        args.extend_from_slice(&["-movflags".to_string(), "+faststart".to_string()]);

        args
    }
}
