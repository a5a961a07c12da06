//! Frame normalization into 8-bit BGR rasters.
//!
//! Samples are linearly rescaled into 0..=255 using either the frame's own
//! range or one range shared by the whole set. Output dimensions are always
//! even so the 4:2:0 encoder accepts them.

use image::RgbImage;

use crate::dicom::{FrameSet, RawFrame, SampleRange};
use crate::error::{MediaError, MediaResult};
use dicomvid_models::NormalizationStrategy;

/// Output value for frames whose samples are all equal.
pub const CONSTANT_FRAME_VALUE: u8 = 128;

/// Number of channels in a normalized raster.
pub const CHANNELS: usize = 3;

/// Round a dimension down to the nearest even number.
pub fn even_floor(n: usize) -> usize {
    n & !1
}

/// Fixed 3-channel, 8-bit raster in blue-green-red order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedFrame {
    index: usize,
    width: u32,
    height: u32,
    bgr: Vec<u8>,
}

impl NormalizedFrame {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved BGR bytes, row-major.
    pub fn as_bgr(&self) -> &[u8] {
        &self.bgr
    }

    /// BGR triple at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.bgr[i], self.bgr[i + 1], self.bgr[i + 2]])
    }

    /// Convert to an RGB image for PNG encoding.
    pub fn to_rgb_image(&self) -> MediaResult<RgbImage> {
        let rgb: Vec<u8> = self
            .bgr
            .chunks_exact(CHANNELS)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect();
        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| {
            MediaError::internal(format!(
                "raster buffer does not match {}x{}",
                self.width, self.height
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSource {
    PerFrame,
    Fixed(SampleRange),
}

/// Rescales raw frames into [`NormalizedFrame`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameNormalizer {
    range: RangeSource,
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::per_frame()
    }
}

impl FrameNormalizer {
    /// Each frame rescaled by its own minimum and maximum.
    pub fn per_frame() -> Self {
        Self {
            range: RangeSource::PerFrame,
        }
    }

    /// Every frame rescaled by the same range.
    pub fn set_wide(range: SampleRange) -> Self {
        Self {
            range: RangeSource::Fixed(range),
        }
    }

    /// Build the normalizer for a strategy; set-wide scans every frame once.
    pub fn for_frame_set(strategy: NormalizationStrategy, frames: &FrameSet) -> Self {
        match strategy {
            NormalizationStrategy::PerFrame => Self::per_frame(),
            NormalizationStrategy::SetWide => Self::set_wide(frames.sample_range()),
        }
    }

    pub fn strategy(&self) -> NormalizationStrategy {
        match self.range {
            RangeSource::PerFrame => NormalizationStrategy::PerFrame,
            RangeSource::Fixed(_) => NormalizationStrategy::SetWide,
        }
    }

    /// Normalize one frame.
    pub fn normalize(&self, frame: &RawFrame) -> MediaResult<NormalizedFrame> {
        let spp = frame.samples_per_pixel();
        if spp != 1 && spp != 3 {
            return Err(MediaError::normalization(format!(
                "frame {} has {} samples per pixel",
                frame.index(),
                spp
            )));
        }
        if frame.samples().len() != frame.expected_len() {
            return Err(MediaError::normalization(format!(
                "frame {} holds {} samples, expected {}x{}x{} = {}",
                frame.index(),
                frame.samples().len(),
                frame.rows(),
                frame.columns(),
                spp,
                frame.expected_len()
            )));
        }

        let width = even_floor(frame.columns());
        let height = even_floor(frame.rows());
        if width == 0 || height == 0 {
            return Err(MediaError::normalization(format!(
                "frame {} is {}x{}, too small to encode",
                frame.index(),
                frame.columns(),
                frame.rows()
            )));
        }

        let range = match self.range {
            RangeSource::Fixed(range) => range,
            RangeSource::PerFrame => frame
                .sample_range()
                .unwrap_or(SampleRange::new(0, 0)),
        };
        let scale = Rescale::new(range);

        let samples = frame.samples();
        let columns = frame.columns();
        let mut bgr = Vec::with_capacity(width * height * CHANNELS);
        for y in 0..height {
            let row = &samples[y * columns * spp..(y * columns + width) * spp];
            if spp == 3 {
                for px in row.chunks_exact(3) {
                    bgr.extend_from_slice(&[scale.apply(px[2]), scale.apply(px[1]), scale.apply(px[0])]);
                }
            } else {
                for &v in row {
                    let v = scale.apply(v);
                    bgr.extend_from_slice(&[v, v, v]);
                }
            }
        }

        Ok(NormalizedFrame {
            index: frame.index(),
            width: width as u32,
            height: height as u32,
            bgr,
        })
    }
}

/// Linear map from a sample range onto 0..=255.
#[derive(Debug, Clone, Copy)]
struct Rescale {
    min: i64,
    factor: Option<f64>,
}

impl Rescale {
    fn new(range: SampleRange) -> Self {
        let factor = if range.is_flat() {
            None
        } else {
            Some(255.0 / (range.max - range.min) as f64)
        };
        Self {
            min: range.min,
            factor,
        }
    }

    fn apply(&self, v: i64) -> u8 {
        match self.factor {
            None => CONSTANT_FRAME_VALUE,
            Some(factor) => ((v - self.min) as f64 * factor).round().clamp(0.0, 255.0) as u8,
        }
    }
}
