//! Multi-frame DICOM reading.
//!
//! Only uncompressed little-endian transfer syntaxes are decoded; the pixel
//! data block must hold every frame back to back.

mod error;
mod frames;
mod reader;
pub mod tags;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::DicomError;
pub use frames::{FrameSet, Frames, PhotometricInterpretation, RawFrame, SampleRange};
pub use reader::Tag;
