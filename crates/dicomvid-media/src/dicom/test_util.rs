//! In-memory DICOM file builder for tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::reader::Tag;
use super::tags::*;

enum Entry {
    Value { vr: [u8; 2], bytes: Vec<u8> },
    UndefinedSequence,
    Encapsulated,
}

/// Builds minimal Part 10 files with the attributes the frame source reads.
pub(crate) struct DicomBuilder {
    explicit: bool,
    transfer_syntax: Option<String>,
    elements: BTreeMap<Tag, Entry>,
}

impl DicomBuilder {
    pub(crate) fn new() -> Self {
        Self {
            explicit: true,
            transfer_syntax: None,
            elements: BTreeMap::new(),
        }
    }

    /// Unsigned 16-bit grayscale frames with pixel values from `pixel(frame, row, col)`.
    pub(crate) fn grayscale16(
        rows: usize,
        columns: usize,
        frames: usize,
        pixel: impl Fn(usize, usize, usize) -> u16,
    ) -> Self {
        let mut data = Vec::with_capacity(rows * columns * frames * 2);
        for f in 0..frames {
            for r in 0..rows {
                for c in 0..columns {
                    data.extend_from_slice(&pixel(f, r, c).to_le_bytes());
                }
            }
        }
        Self::new()
            .geometry(rows, columns, frames, 1, 16)
            .cs(PHOTOMETRIC_INTERPRETATION, "MONOCHROME2")
            .pixel_data(*b"OW", data)
    }

    /// Interleaved 8-bit RGB frames.
    pub(crate) fn rgb8(
        rows: usize,
        columns: usize,
        frames: usize,
        pixel: impl Fn(usize, usize, usize) -> [u8; 3],
    ) -> Self {
        let mut data = Vec::with_capacity(rows * columns * frames * 3);
        for f in 0..frames {
            for r in 0..rows {
                for c in 0..columns {
                    data.extend_from_slice(&pixel(f, r, c));
                }
            }
        }
        Self::new()
            .geometry(rows, columns, frames, 3, 8)
            .cs(PHOTOMETRIC_INTERPRETATION, "RGB")
            .us(PLANAR_CONFIGURATION, 0)
            .pixel_data(*b"OB", data)
    }

    pub(crate) fn geometry(
        self,
        rows: usize,
        columns: usize,
        frames: usize,
        samples_per_pixel: u16,
        bits: u16,
    ) -> Self {
        self.us(SAMPLES_PER_PIXEL, samples_per_pixel)
            .is(NUMBER_OF_FRAMES, &frames.to_string())
            .us(ROWS, rows as u16)
            .us(COLUMNS, columns as u16)
            .us(BITS_ALLOCATED, bits)
            .us(BITS_STORED, bits)
            .us(PIXEL_REPRESENTATION, 0)
    }

    pub(crate) fn us(mut self, tag: Tag, value: u16) -> Self {
        self.elements.insert(
            tag,
            Entry::Value {
                vr: *b"US",
                bytes: value.to_le_bytes().to_vec(),
            },
        );
        self
    }

    pub(crate) fn is(mut self, tag: Tag, value: &str) -> Self {
        self.elements.insert(
            tag,
            Entry::Value {
                vr: *b"IS",
                bytes: padded(value.as_bytes(), b' '),
            },
        );
        self
    }

    pub(crate) fn cs(mut self, tag: Tag, value: &str) -> Self {
        self.elements.insert(
            tag,
            Entry::Value {
                vr: *b"CS",
                bytes: padded(value.as_bytes(), b' '),
            },
        );
        self
    }

    pub(crate) fn pixel_data(mut self, vr: [u8; 2], data: Vec<u8>) -> Self {
        self.elements.insert(
            PIXEL_DATA,
            Entry::Value {
                vr,
                bytes: padded(&data, 0),
            },
        );
        self
    }

    pub(crate) fn remove(mut self, tag: Tag) -> Self {
        self.elements.remove(&tag);
        self
    }

    pub(crate) fn implicit(mut self) -> Self {
        self.explicit = false;
        self
    }

    pub(crate) fn transfer_syntax(mut self, uid: &str) -> Self {
        self.transfer_syntax = Some(uid.to_string());
        self
    }

    /// Adds an undefined-length sequence with one undefined-length item.
    pub(crate) fn with_undefined_length_sequence(mut self) -> Self {
        self.elements
            .insert(Tag(0x0008, 0x1140), Entry::UndefinedSequence);
        self
    }

    pub(crate) fn with_encapsulated_pixel_data(mut self) -> Self {
        self.elements.insert(PIXEL_DATA, Entry::Encapsulated);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");

        let ts = self.transfer_syntax.clone().unwrap_or_else(|| {
            if self.explicit {
                EXPLICIT_VR_LITTLE_ENDIAN.to_string()
            } else {
                IMPLICIT_VR_LITTLE_ENDIAN.to_string()
            }
        });
        write_element(&mut out, true, Tag(0x0002, 0x0001), *b"OB", &[0, 1]);
        write_element(&mut out, true, TRANSFER_SYNTAX_UID, *b"UI", &padded(ts.as_bytes(), 0));

        for (tag, entry) in &self.elements {
            match entry {
                Entry::Value { vr, bytes } => write_element(&mut out, self.explicit, *tag, *vr, bytes),
                Entry::UndefinedSequence => {
                    write_header(&mut out, self.explicit, *tag, *b"SQ", u32::MAX);
                    write_delimiter(&mut out, ITEM, u32::MAX);
                    write_element(
                        &mut out,
                        self.explicit,
                        Tag(0x0008, 0x1150),
                        *b"UI",
                        &padded(b"1.2.3", 0),
                    );
                    write_delimiter(&mut out, ITEM_DELIMITATION, 0);
                    write_delimiter(&mut out, SEQUENCE_DELIMITATION, 0);
                }
                Entry::Encapsulated => {
                    write_header(&mut out, self.explicit, *tag, *b"OB", u32::MAX);
                    write_delimiter(&mut out, ITEM, 0);
                    write_delimiter(&mut out, ITEM, 4);
                    out.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
                    write_delimiter(&mut out, SEQUENCE_DELIMITATION, 0);
                }
            }
        }
        out
    }

    /// Write the file into `dir` and return its path.
    pub(crate) fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

fn padded(value: &[u8], pad: u8) -> Vec<u8> {
    let mut bytes = value.to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(pad);
    }
    bytes
}

fn is_long_vr(vr: &[u8; 2]) -> bool {
    matches!(vr, b"OB" | b"OW" | b"SQ" | b"UN" | b"UT")
}

fn write_header(out: &mut Vec<u8>, explicit: bool, tag: Tag, vr: [u8; 2], length: u32) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    if !explicit {
        out.extend_from_slice(&length.to_le_bytes());
        return;
    }
    out.extend_from_slice(&vr);
    if is_long_vr(&vr) {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&length.to_le_bytes());
    } else {
        out.extend_from_slice(&(length as u16).to_le_bytes());
    }
}

fn write_element(out: &mut Vec<u8>, explicit: bool, tag: Tag, vr: [u8; 2], value: &[u8]) {
    write_header(out, explicit, tag, vr, value.len() as u32);
    out.extend_from_slice(value);
}

fn write_delimiter(out: &mut Vec<u8>, tag: Tag, length: u32) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    out.extend_from_slice(&length.to_le_bytes());
}
