//! Conversion job definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::encoding::{EncodingProfile, QualityTier, DEFAULT_FRAMERATE};
use crate::normalization::NormalizationStrategy;

/// Unique identifier for a conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConversionId(pub String);

impl ConversionId {
    /// Generate a new random conversion ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage of a single conversion job.
///
/// `Idle → Reading → Normalizing → Staging → Encoding → Validating → Done`,
/// with `Failed` reachable from every stage up to and including `Encoding`.
/// Validation is advisory, so `Validating` only ever leads to `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    #[default]
    Idle,
    Reading,
    Normalizing,
    Staging,
    Encoding,
    Validating,
    Done,
    Failed,
}

/// Rejected stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid stage transition: {from} -> {to}")]
pub struct StageTransitionError {
    pub from: ConversionStage,
    pub to: ConversionStage,
}

impl ConversionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStage::Idle => "idle",
            ConversionStage::Reading => "reading",
            ConversionStage::Normalizing => "normalizing",
            ConversionStage::Staging => "staging",
            ConversionStage::Encoding => "encoding",
            ConversionStage::Validating => "validating",
            ConversionStage::Done => "done",
            ConversionStage::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStage::Done | ConversionStage::Failed)
    }

    /// Check whether `next` may follow this stage.
    pub fn can_transition_to(&self, next: ConversionStage) -> bool {
        use ConversionStage::*;
        matches!(
            (self, next),
            (Idle, Reading)
                | (Reading, Normalizing)
                | (Normalizing, Staging)
                | (Staging, Encoding)
                | (Encoding, Validating)
                | (Validating, Done)
                | (Idle | Reading | Normalizing | Staging | Encoding, Failed)
        )
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(self, next: ConversionStage) -> Result<ConversionStage, StageTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StageTransitionError { from: self, to: next })
        }
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied conversion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConversionOptions {
    /// Output frame rate
    #[serde(default = "default_framerate")]
    pub framerate: u32,

    /// Quality tier, ignored when `bitrate` is set
    #[serde(default)]
    pub quality: QualityTier,

    /// Explicit target bitrate in bits per second
    #[serde(default)]
    pub bitrate: Option<u64>,

    /// Frame normalization strategy
    #[serde(default)]
    pub normalization: NormalizationStrategy,

    /// Run the decode check on the produced file
    #[serde(default = "default_validate")]
    pub validate: bool,
}

fn default_framerate() -> u32 {
    DEFAULT_FRAMERATE
}
fn default_validate() -> bool {
    true
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            framerate: DEFAULT_FRAMERATE,
            quality: QualityTier::default(),
            bitrate: None,
            normalization: NormalizationStrategy::default(),
            validate: true,
        }
    }
}

impl ConversionOptions {
    /// Build the encoding profile these options describe.
    pub fn to_profile(&self) -> EncodingProfile {
        let profile = EncodingProfile::new().with_framerate(self.framerate);
        match self.bitrate {
            Some(bitrate) => profile.with_bitrate(bitrate),
            None => profile.with_quality(self.quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::RateControl;

    #[test]
    fn test_happy_path_transitions() {
        use ConversionStage::*;
        let mut stage = Idle;
        for next in [Reading, Normalizing, Staging, Encoding, Validating, Done] {
            stage = stage.advance(next).unwrap();
        }
        assert_eq!(stage, Done);
        assert!(stage.is_terminal());
    }

    #[test]
    fn test_validation_never_fails_the_job() {
        assert!(!ConversionStage::Validating.can_transition_to(ConversionStage::Failed));
        assert!(ConversionStage::Encoding.can_transition_to(ConversionStage::Failed));
        assert!(ConversionStage::Reading.can_transition_to(ConversionStage::Failed));
    }

    #[test]
    fn test_rejects_skipping_stages() {
        let err = ConversionStage::Reading
            .advance(ConversionStage::Encoding)
            .unwrap_err();
        assert_eq!(err.from, ConversionStage::Reading);
        assert_eq!(err.to, ConversionStage::Encoding);
        assert!(ConversionStage::Done.advance(ConversionStage::Reading).is_err());
    }

    #[test]
    fn test_options_default_profile() {
        let profile = ConversionOptions::default().to_profile();
        assert_eq!(profile.framerate, 30);
        assert_eq!(profile.rate_control, RateControl::quality(QualityTier::Normal));
    }

    #[test]
    fn test_bitrate_overrides_quality() {
        let options = ConversionOptions {
            bitrate: Some(4_000_000),
            quality: QualityTier::High,
            ..Default::default()
        };
        assert_eq!(options.to_profile().rate_control, RateControl::bitrate(4_000_000));
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: ConversionOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ConversionOptions::default());
    }
}
