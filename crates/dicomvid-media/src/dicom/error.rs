//! DICOM format errors.

use thiserror::Error;

use super::reader::Tag;

/// Reasons a file cannot be used as a multi-frame pixel source.
#[derive(Debug, Error)]
pub enum DicomError {
    #[error("Not a DICOM file: missing DICM magic")]
    NotDicom,

    #[error("Truncated DICOM data at offset {offset}")]
    Truncated { offset: usize },

    #[error("Malformed element {tag} at offset {offset}: {reason}")]
    Malformed {
        tag: Tag,
        offset: usize,
        reason: String,
    },

    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Encapsulated (compressed) pixel data is not supported")]
    EncapsulatedPixelData,

    #[error("DICOM file does not contain valid video data: missing {0}")]
    MissingAttribute(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidAttribute { name: &'static str, value: String },

    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    #[error(
        "Pixel data holds {actual} bytes but {frames} frames of {rows}x{columns}x{samples_per_pixel} at {bytes_per_sample} bytes per sample need {expected}"
    )]
    PixelDataMismatch {
        frames: usize,
        rows: usize,
        columns: usize,
        samples_per_pixel: usize,
        bytes_per_sample: usize,
        expected: usize,
        actual: usize,
    },

    #[error("IO error reading DICOM file: {0}")]
    Io(#[from] std::io::Error),
}
