//! Shared data models for the DICOM to video converter.
//!
//! This crate provides Serde-serializable types for:
//! - Encoding profiles (quality tiers and explicit bitrates)
//! - Conversion options and frame normalization strategies
//! - The conversion job state machine
//! - The request/response envelope of the serving boundary

pub mod encoding;
pub mod envelope;
pub mod job;
pub mod normalization;

// Re-export common types
pub use encoding::{ColorTags, EncodingProfile, ProfileError, QualityTier, RateControl};
pub use envelope::{is_truthy, ConversionBody, ErrorBody, InvokeRequest, InvokeResponse, PongBody};
pub use job::{ConversionId, ConversionOptions, ConversionStage, StageTransitionError};
pub use normalization::NormalizationStrategy;
