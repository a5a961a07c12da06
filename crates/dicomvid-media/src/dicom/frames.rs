//! Frame sets and raw frames.

use std::fmt;
use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use super::error::DicomError;
use super::reader::DataSet;
use super::tags::{
    BITS_ALLOCATED, BITS_STORED, COLUMNS, NUMBER_OF_FRAMES, PHOTOMETRIC_INTERPRETATION, PIXEL_DATA,
    PIXEL_REPRESENTATION, PLANAR_CONFIGURATION, ROWS, SAMPLES_PER_PIXEL,
};

/// Colour model of the stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotometricInterpretation {
    /// Grayscale, minimum sample is white
    Monochrome1,
    /// Grayscale, minimum sample is black
    Monochrome2,
    Rgb,
}

impl PhotometricInterpretation {
    fn resolve(value: Option<String>, samples_per_pixel: usize) -> Result<Self, DicomError> {
        let interpretation = match value.as_deref() {
            None | Some("") if samples_per_pixel == 3 => Self::Rgb,
            None | Some("") => Self::Monochrome2,
            Some("MONOCHROME1") => Self::Monochrome1,
            Some("MONOCHROME2") => Self::Monochrome2,
            Some("RGB") => Self::Rgb,
            Some(other) => {
                return Err(DicomError::UnsupportedLayout(format!(
                    "photometric interpretation {other}"
                )))
            }
        };

        let expected_samples = if interpretation == Self::Rgb { 3 } else { 1 };
        if expected_samples != samples_per_pixel {
            return Err(DicomError::UnsupportedLayout(format!(
                "{interpretation} with {samples_per_pixel} samples per pixel"
            )));
        }
        Ok(interpretation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monochrome1 => "MONOCHROME1",
            Self::Monochrome2 => "MONOCHROME2",
            Self::Rgb => "RGB",
        }
    }
}

impl fmt::Display for PhotometricInterpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive minimum and maximum of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub min: i64,
    pub max: i64,
}

impl SampleRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Range of `samples`, `None` when empty.
    pub fn of(samples: &[i64]) -> Option<Self> {
        let first = *samples.first()?;
        Some(samples.iter().fold(Self::new(first, first), |range, &v| {
            Self::new(range.min.min(v), range.max.max(v))
        }))
    }

    /// Smallest range covering both.
    pub fn union(self, other: Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// All samples share one value.
    pub fn is_flat(&self) -> bool {
        self.min == self.max
    }
}

/// One frame of decoded samples, interleaved per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    index: usize,
    rows: usize,
    columns: usize,
    samples_per_pixel: usize,
    samples: Vec<i64>,
}

impl RawFrame {
    pub fn new(
        index: usize,
        rows: usize,
        columns: usize,
        samples_per_pixel: usize,
        samples: Vec<i64>,
    ) -> Self {
        Self {
            index,
            rows,
            columns,
            samples_per_pixel,
            samples,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.samples_per_pixel
    }

    pub fn samples(&self) -> &[i64] {
        &self.samples
    }

    /// Number of samples the declared shape requires.
    pub fn expected_len(&self) -> usize {
        self.rows * self.columns * self.samples_per_pixel
    }

    pub fn sample_range(&self) -> Option<SampleRange> {
        SampleRange::of(&self.samples)
    }
}

/// A validated multi-frame pixel source.
///
/// The pixel data block is checked against the declared geometry when the
/// set is opened; frames are decoded lazily by [`FrameSet::into_frames`].
#[derive(Debug)]
pub struct FrameSet {
    frame_count: usize,
    rows: usize,
    columns: usize,
    samples_per_pixel: usize,
    bits_allocated: u16,
    bits_stored: u16,
    signed: bool,
    planar: bool,
    photometric: PhotometricInterpretation,
    pixel_data: Vec<u8>,
}

impl FrameSet {
    /// Read and validate a DICOM file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DicomError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(bytes)
    }

    /// Validate a DICOM file held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DicomError> {
        let data = DataSet::parse(bytes)?;

        if !data.contains(PIXEL_DATA) {
            return Err(DicomError::MissingAttribute("PixelData"));
        }
        let frames_value = data
            .string(NUMBER_OF_FRAMES)
            .ok_or(DicomError::MissingAttribute("NumberOfFrames"))?;
        let frame_count: usize =
            frames_value
                .parse()
                .map_err(|_| DicomError::InvalidAttribute {
                    name: "NumberOfFrames",
                    value: frames_value.clone(),
                })?;

        let rows = required_u16(&data, ROWS, "Rows")? as usize;
        let columns = required_u16(&data, COLUMNS, "Columns")? as usize;
        let bits_allocated = required_u16(&data, BITS_ALLOCATED, "BitsAllocated")?;
        let samples_per_pixel = data.u16(SAMPLES_PER_PIXEL, "SamplesPerPixel")?.unwrap_or(1) as usize;
        let bits_stored = data.u16(BITS_STORED, "BitsStored")?.unwrap_or(bits_allocated);
        let pixel_representation = data
            .u16(PIXEL_REPRESENTATION, "PixelRepresentation")?
            .unwrap_or(0);
        let planar_configuration = data
            .u16(PLANAR_CONFIGURATION, "PlanarConfiguration")?
            .unwrap_or(0);

        for (name, value) in [("NumberOfFrames", frame_count), ("Rows", rows), ("Columns", columns)] {
            if value == 0 {
                return Err(DicomError::InvalidAttribute {
                    name,
                    value: value.to_string(),
                });
            }
        }
        if samples_per_pixel != 1 && samples_per_pixel != 3 {
            return Err(DicomError::UnsupportedLayout(format!(
                "{samples_per_pixel} samples per pixel"
            )));
        }
        if !matches!(bits_allocated, 8 | 16 | 32) {
            return Err(DicomError::UnsupportedLayout(format!(
                "{bits_allocated} bits allocated"
            )));
        }
        if bits_stored == 0 || bits_stored > bits_allocated {
            return Err(DicomError::InvalidAttribute {
                name: "BitsStored",
                value: bits_stored.to_string(),
            });
        }
        if pixel_representation > 1 {
            return Err(DicomError::InvalidAttribute {
                name: "PixelRepresentation",
                value: pixel_representation.to_string(),
            });
        }
        let photometric = PhotometricInterpretation::resolve(
            data.string(PHOTOMETRIC_INTERPRETATION),
            samples_per_pixel,
        )?;

        let bytes_per_sample = usize::from(bits_allocated / 8);
        let expected = frame_count
            .saturating_mul(rows)
            .saturating_mul(columns)
            .saturating_mul(samples_per_pixel)
            .saturating_mul(bytes_per_sample);
        let actual = data.pixel_data_len().unwrap_or(0);
        // Odd-length values carry one padding byte
        let padded = expected % 2 == 1 && actual == expected + 1;
        if actual != expected && !padded {
            return Err(DicomError::PixelDataMismatch {
                frames: frame_count,
                rows,
                columns,
                samples_per_pixel,
                bytes_per_sample,
                expected,
                actual,
            });
        }

        let mut pixel_data = data
            .into_pixel_data()
            .ok_or(DicomError::MissingAttribute("PixelData"))?;
        pixel_data.truncate(expected);

        debug!(
            frames = frame_count,
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            signed = pixel_representation == 1,
            photometric = %photometric,
            "Opened DICOM frame set"
        );

        Ok(Self {
            frame_count,
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            signed: pixel_representation == 1,
            planar: planar_configuration == 1,
            photometric,
            pixel_data,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn samples_per_pixel(&self) -> usize {
        self.samples_per_pixel
    }

    pub fn bits_allocated(&self) -> u16 {
        self.bits_allocated
    }

    pub fn bits_stored(&self) -> u16 {
        self.bits_stored
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn photometric(&self) -> PhotometricInterpretation {
        self.photometric
    }

    fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_allocated / 8)
    }

    fn samples_per_frame(&self) -> usize {
        self.rows * self.columns * self.samples_per_pixel
    }

    /// Range of every sample across every frame.
    pub fn sample_range(&self) -> SampleRange {
        (0..self.frame_count)
            .into_par_iter()
            .filter_map(|index| self.decode_frame(index).sample_range())
            .reduce_with(SampleRange::union)
            .unwrap_or(SampleRange::new(0, 0))
    }

    /// Consume the set into its ordered frames.
    pub fn into_frames(self) -> Frames {
        Frames {
            set: self,
            next: 0,
        }
    }

    fn decode_frame(&self, index: usize) -> RawFrame {
        let bytes_per_sample = self.bytes_per_sample();
        let frame_bytes = self.samples_per_frame() * bytes_per_sample;
        let start = index * frame_bytes;

        let mut samples: Vec<i64> = self.pixel_data[start..start + frame_bytes]
            .chunks_exact(bytes_per_sample)
            .map(|chunk| self.decode_sample(chunk))
            .collect();

        if self.planar && self.samples_per_pixel == 3 {
            samples = interleave_planes(&samples, self.rows * self.columns);
        }

        RawFrame::new(index, self.rows, self.columns, self.samples_per_pixel, samples)
    }

    fn decode_sample(&self, chunk: &[u8]) -> i64 {
        let raw = match chunk {
            [a] => u64::from(*a),
            [a, b] => u64::from(u16::from_le_bytes([*a, *b])),
            [a, b, c, d] => u64::from(u32::from_le_bytes([*a, *b, *c, *d])),
            _ => 0,
        };
        let bits = u32::from(self.bits_stored);
        let value = raw & ((1u64 << bits) - 1);

        if self.signed && value & (1u64 << (bits - 1)) != 0 {
            value as i64 - (1i64 << bits)
        } else {
            value as i64
        }
    }
}

fn interleave_planes(planar: &[i64], pixels: usize) -> Vec<i64> {
    let mut interleaved = Vec::with_capacity(planar.len());
    for pixel in 0..pixels {
        for plane in 0..3 {
            interleaved.push(planar[plane * pixels + pixel]);
        }
    }
    interleaved
}

fn required_u16(data: &DataSet, tag: super::reader::Tag, name: &'static str) -> Result<u16, DicomError> {
    data.u16(tag, name)?.ok_or(DicomError::MissingAttribute(name))
}

/// Ordered, finite, consume-once sequence of frames.
#[derive(Debug)]
pub struct Frames {
    set: FrameSet,
    next: usize,
}

impl Frames {
    pub fn rows(&self) -> usize {
        self.set.rows
    }

    pub fn columns(&self) -> usize {
        self.set.columns
    }
}

impl Iterator for Frames {
    type Item = RawFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.set.frame_count {
            return None;
        }
        let frame = self.set.decode_frame(self.next);
        self.next += 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.set.frame_count - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames {}
