//! Frame normalization strategies.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which sample range is used to rescale a frame into 8-bit output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationStrategy {
    /// Each frame is rescaled by its own minimum and maximum.
    ///
    /// Frames with differing sample ranges may visibly flicker in brightness.
    #[default]
    PerFrame,
    /// One minimum/maximum is computed across the whole frame set and
    /// applied to every frame.
    SetWide,
}

impl NormalizationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationStrategy::PerFrame => "per_frame",
            NormalizationStrategy::SetWide => "set_wide",
        }
    }
}
