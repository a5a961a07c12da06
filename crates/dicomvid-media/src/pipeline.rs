//! Sequential conversion pipeline.
//!
//! `Reading → Normalizing → Staging → Encoding → Validating → Done`. Reading,
//! normalizing and staging run on the blocking pool; the staged frames live
//! in a temporary directory that is gone by the time [`Converter::convert`]
//! returns, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::dicom::FrameSet;
use crate::encode::{EncodingResult, VideoEncoder};
use crate::error::{MediaError, MediaResult};
use crate::normalize::FrameNormalizer;
use crate::probe::{probe_video, VideoInfo};
use crate::stage::{FrameStager, StagingArea};
use crate::tools::ToolPaths;
use crate::validate::{OutputValidator, ValidationReport};
use dicomvid_models::{ConversionId, ConversionOptions, ConversionStage, NormalizationStrategy};

/// Metric names as constants for consistency.
pub mod names {
    pub const CONVERSIONS_TOTAL: &str = "dicomvid_conversions_total";
    pub const CONVERSION_FAILURES_TOTAL: &str = "dicomvid_conversion_failures_total";
    pub const CONVERSION_DURATION_SECONDS: &str = "dicomvid_conversion_duration_seconds";
    pub const FRAMES_STAGED_TOTAL: &str = "dicomvid_frames_staged_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "dicomvid_ffmpeg_duration_seconds";
}

/// A conversion that stopped at `stage`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: ConversionStage,
    #[source]
    pub source: MediaError,
}

impl PipelineError {
    /// Message of the underlying failure, without the stage prefix.
    pub fn message(&self) -> String {
        self.source.to_string()
    }

    pub fn is_format_error(&self) -> bool {
        self.source.is_format_error()
    }
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub id: ConversionId,
    pub output: PathBuf,
    /// Frames staged and encoded
    pub frames: usize,
    /// Encoded width after even cropping
    pub width: u32,
    /// Encoded height after even cropping
    pub height: u32,
    pub normalization: NormalizationStrategy,
    pub encoding: EncodingResult,
    /// `None` when the decode check was disabled
    pub validation: Option<ValidationReport>,
    pub probe: Option<VideoInfo>,
    /// Advisory findings from validation and probing
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

/// Result of the blocking half of a conversion.
#[derive(Debug)]
struct Prepared {
    staging: StagingArea,
    width: u32,
    height: u32,
}

/// Walks one conversion through [`ConversionStage`].
#[derive(Debug, Clone)]
struct StageTracker {
    id: ConversionId,
    stage: ConversionStage,
}

impl StageTracker {
    fn new(id: ConversionId) -> Self {
        Self {
            id,
            stage: ConversionStage::Idle,
        }
    }

    fn advance(&mut self, next: ConversionStage) -> MediaResult<()> {
        self.stage = self
            .stage
            .advance(next)
            .map_err(|e| MediaError::internal(e.to_string()))?;
        debug!(conversion_id = %self.id, stage = %self.stage, "Conversion stage");
        Ok(())
    }

    /// Record the failure and attribute it to the stage that produced it.
    fn fail(&mut self, source: MediaError) -> PipelineError {
        // Frames are normalized while they are staged
        let stage = match (&source, self.stage) {
            (MediaError::Normalization(_), ConversionStage::Staging) => ConversionStage::Normalizing,
            (_, stage) => stage,
        };
        warn!(conversion_id = %self.id, stage = %stage, "Conversion failed: {}", source);
        counter!(names::CONVERSIONS_TOTAL, "outcome" => "failed").increment(1);
        counter!(names::CONVERSION_FAILURES_TOTAL, "stage" => stage.as_str()).increment(1);
        if self.stage.can_transition_to(ConversionStage::Failed) {
            self.stage = ConversionStage::Failed;
        }
        PipelineError { stage, source }
    }
}

/// Converts multi-frame DICOM files into H.264 MP4 files.
#[derive(Debug, Clone)]
pub struct Converter {
    tools: ToolPaths,
    stager: FrameStager,
    encoder: VideoEncoder,
    validator: OutputValidator,
}

impl Converter {
    /// Create a converter using the given tool locations.
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            encoder: VideoEncoder::new(&tools.ffmpeg),
            validator: OutputValidator::new(&tools.ffmpeg),
            stager: FrameStager::new(),
            tools,
        }
    }

    /// Stage frames under `dir` instead of the system temporary directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stager = FrameStager::in_dir(dir);
        self
    }

    /// Abort FFmpeg invocations running longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.encoder = self.encoder.with_timeout(secs);
        self.validator = self.validator.with_timeout(secs);
        self
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Convert `input` into an MP4 file at `output`.
    pub async fn convert(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &ConversionOptions,
    ) -> Result<ConversionReport, PipelineError> {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let start = Instant::now();
        let mut tracker = StageTracker::new(ConversionId::new());
        info!(
            conversion_id = %tracker.id,
            normalization = options.normalization.as_str(),
            "Converting {} -> {}",
            input.display(),
            output.display()
        );

        let profile = options.to_profile();
        profile.validate().map_err(|e| tracker.fail(e.into()))?;

        // Reading, normalizing and staging
        let stager = self.stager.clone();
        let strategy = options.normalization;
        let shared = Arc::new(Mutex::new(tracker));
        let task_tracker = Arc::clone(&shared);
        let joined = tokio::task::spawn_blocking(move || {
            let mut tracker = task_tracker.lock().unwrap_or_else(PoisonError::into_inner);
            prepare(&input, &stager, strategy, &mut tracker)
        })
        .await;
        let (mut tracker, prepared) = join_prepared(&shared, joined)?;
        counter!(names::FRAMES_STAGED_TOTAL).increment(prepared.staging.frame_count() as u64);

        // Encoding
        tracker.advance(ConversionStage::Encoding).map_err(|e| tracker.fail(e))?;
        let encoding = match self.encoder.encode(&prepared.staging, &profile, &output).await {
            Ok(result) => result,
            Err(e) => return Err(tracker.fail(e)),
        };
        histogram!(names::FFMPEG_DURATION_SECONDS).record(encoding.duration_ms as f64 / 1000.0);

        let frames = prepared.staging.frame_count();
        if let Err(e) = prepared.staging.close() {
            warn!(conversion_id = %tracker.id, "Failed to remove staging area: {}", e);
        }

        // Validating
        tracker.advance(ConversionStage::Validating).map_err(|e| tracker.fail(e))?;
        let mut warnings = Vec::new();
        let validation = if options.validate {
            let report = self.validator.validate(&output).await;
            warnings.extend(report.messages());
            Some(report)
        } else {
            debug!(conversion_id = %tracker.id, "Decode check disabled");
            None
        };

        let probe = match &self.tools.ffprobe {
            Some(ffprobe) => match probe_video(ffprobe, &output).await {
                Ok(info) => {
                    if let Some(count) = info.frame_count.filter(|&c| c != frames as u64) {
                        warnings.push(format!("output holds {count} frames, {frames} were encoded"));
                    }
                    Some(info)
                }
                Err(e) => {
                    warn!(conversion_id = %tracker.id, "Probe failed: {}", e);
                    warnings.push(format!("probe failed: {e}"));
                    None
                }
            },
            None => None,
        };

        tracker.advance(ConversionStage::Done).map_err(|e| tracker.fail(e))?;

        let elapsed = start.elapsed();
        counter!(names::CONVERSIONS_TOTAL, "outcome" => "succeeded").increment(1);
        histogram!(names::CONVERSION_DURATION_SECONDS).record(elapsed.as_secs_f64());
        info!(
            conversion_id = %tracker.id,
            frames,
            width = prepared.width,
            height = prepared.height,
            warnings = warnings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Conversion complete"
        );

        Ok(ConversionReport {
            id: tracker.id,
            output,
            frames,
            width: prepared.width,
            height: prepared.height,
            normalization: strategy,
            encoding,
            validation,
            probe,
            warnings,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Read the input, then normalize and stage every frame.
///
/// The input is fully validated before the staging directory is created.
/// Take the tracker back from the blocking half, which may have panicked
/// mid-stage, and attribute any failure to the stage it reached.
fn join_prepared(
    shared: &Mutex<StageTracker>,
    joined: Result<MediaResult<Prepared>, JoinError>,
) -> Result<(StageTracker, Prepared), PipelineError> {
    let mut tracker = shared.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let result = joined
        .unwrap_or_else(|e| Err(MediaError::internal(format!("staging task failed: {e}"))));
    match result {
        Ok(prepared) => Ok((tracker, prepared)),
        Err(e) => Err(tracker.fail(e)),
    }
}

fn prepare(
    input: &Path,
    stager: &FrameStager,
    strategy: NormalizationStrategy,
    tracker: &mut StageTracker,
) -> MediaResult<Prepared> {
    tracker.advance(ConversionStage::Reading)?;
    let frame_set = FrameSet::open(input)?;
    info!(
        conversion_id = %tracker.id,
        frames = frame_set.frame_count(),
        rows = frame_set.rows(),
        columns = frame_set.columns(),
        samples_per_pixel = frame_set.samples_per_pixel(),
        bits_stored = frame_set.bits_stored(),
        photometric = %frame_set.photometric(),
        "Read DICOM frame set"
    );

    tracker.advance(ConversionStage::Normalizing)?;
    let normalizer = FrameNormalizer::for_frame_set(strategy, &frame_set);
    let (rows, columns) = (frame_set.rows(), frame_set.columns());

    tracker.advance(ConversionStage::Staging)?;
    let staging = stager.stage(
        frame_set
            .into_frames()
            .map(|frame| normalizer.normalize(&frame)),
    )?;

    let (width, height) = staging
        .dimensions()
        .ok_or_else(|| MediaError::staging("frame set contains no frames"))?;
    if (width as usize, height as usize) != (columns, rows) {
        info!(
            conversion_id = %tracker.id,
            "Cropped frames from {}x{} to {}x{}",
            columns,
            rows,
            width,
            height
        );
    }

    Ok(Prepared {
        staging,
        width,
        height,
    })
}
