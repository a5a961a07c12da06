#![deny(unreachable_patterns)]
//! DICOM to video conversion core.
//!
//! This crate provides:
//! - A reader for uncompressed multi-frame DICOM files
//! - Per-frame (or set-wide) normalization into even-sized 8-bit BGR rasters
//! - Scoped staging of numbered PNG frames
//! - Type-safe FFmpeg command building, H.264 encoding and decode validation
//! - The sequential conversion pipeline tying these together

pub mod command;
pub mod dicom;
pub mod encode;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod probe;
pub mod stage;
pub mod tools;
pub mod validate;

pub use command::{CommandOutput, FfmpegCommand, FfmpegRunner};
pub use dicom::{DicomError, FrameSet, Frames, PhotometricInterpretation, RawFrame, SampleRange};
pub use encode::{EncodingResult, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use normalize::{FrameNormalizer, NormalizedFrame};
pub use pipeline::{ConversionReport, Converter, PipelineError};
pub use probe::{probe_video, VideoInfo};
pub use stage::{FrameStager, StagingArea};
pub use tools::ToolPaths;
pub use validate::{OutputValidator, ValidationReport, ValidationWarning};
