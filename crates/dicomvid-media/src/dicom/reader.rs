//! DICOM Part 10 element reader.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use super::error::DicomError;
use super::tags::{
    EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN, ITEM, ITEM_DELIMITATION, PIXEL_DATA,
    SEQUENCE_DELIMITATION, TRANSFER_SYNTAX_UID,
};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const META_GROUP: u16 = 0x0002;
const DELIMITER_GROUP: u16 = 0xFFFE;
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// VRs encoded with two reserved bytes and a 32-bit length in explicit VR.
const LONG_VRS: [&[u8; 2]; 13] = [
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT", b"UV",
];

/// Data element tag as (group, element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

#[derive(Debug, Clone)]
struct Element {
    value: Range<usize>,
}

/// Top-level elements of a DICOM file up to and including pixel data.
#[derive(Debug)]
pub(crate) struct DataSet {
    bytes: Vec<u8>,
    transfer_syntax: String,
    elements: HashMap<Tag, Element>,
}

#[derive(Debug)]
struct Header {
    tag: Tag,
    vr: Option<[u8; 2]>,
    length: u32,
    offset: usize,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<Range<usize>, DicomError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DicomError::Truncated { offset: self.pos })?;
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }

    fn u16(&mut self) -> Result<u16, DicomError> {
        let r = self.take(2)?;
        Ok(u16::from_le_bytes([self.buf[r.start], self.buf[r.start + 1]]))
    }

    fn u32(&mut self) -> Result<u32, DicomError> {
        let r = self.take(4)?;
        let b = &self.buf[r];
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek_group(&self) -> Option<u16> {
        let b = self.buf.get(self.pos..self.pos + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn header(&mut self) -> Result<Header, DicomError> {
        let offset = self.pos;
        let tag = Tag(self.u16()?, self.u16()?);

        // Items and delimiters never carry a VR
        if tag.0 == DELIMITER_GROUP || !self.explicit {
            let length = self.u32()?;
            return Ok(Header {
                tag,
                vr: None,
                length,
                offset,
            });
        }

        let r = self.take(2)?;
        let vr = [self.buf[r.start], self.buf[r.start + 1]];
        let length = if LONG_VRS.contains(&&vr) {
            self.take(2)?;
            self.u32()?
        } else {
            u32::from(self.u16()?)
        };

        Ok(Header {
            tag,
            vr: Some(vr),
            length,
            offset,
        })
    }

    fn skip_value(&mut self, header: &Header) -> Result<(), DicomError> {
        if header.length != UNDEFINED_LENGTH {
            self.take(header.length as usize)?;
            return Ok(());
        }
        if header.tag == PIXEL_DATA {
            return Err(DicomError::EncapsulatedPixelData);
        }
        self.skip_undefined_sequence()
    }

    fn skip_undefined_sequence(&mut self) -> Result<(), DicomError> {
        loop {
            let header = self.header()?;
            match header.tag {
                SEQUENCE_DELIMITATION => return Ok(()),
                ITEM if header.length == UNDEFINED_LENGTH => self.skip_undefined_item()?,
                ITEM => {
                    self.take(header.length as usize)?;
                }
                other => {
                    return Err(DicomError::Malformed {
                        tag: other,
                        offset: header.offset,
                        reason: "expected a sequence item".to_string(),
                    })
                }
            }
        }
    }

    fn skip_undefined_item(&mut self) -> Result<(), DicomError> {
        loop {
            let header = self.header()?;
            if header.tag == ITEM_DELIMITATION {
                return Ok(());
            }
            self.skip_value(&header)?;
        }
    }
}

impl DataSet {
    /// Parse a DICOM Part 10 file held in memory.
    pub(crate) fn parse(bytes: Vec<u8>) -> Result<Self, DicomError> {
        if bytes.len() < PREAMBLE_LEN + MAGIC.len()
            || &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] != MAGIC
        {
            return Err(DicomError::NotDicom);
        }

        let mut cursor = Cursor {
            buf: &bytes,
            pos: PREAMBLE_LEN + MAGIC.len(),
            explicit: true,
        };

        // File meta information is always explicit VR little endian
        let mut transfer_syntax = None;
        while cursor.peek_group() == Some(META_GROUP) {
            let header = cursor.header()?;
            if header.length == UNDEFINED_LENGTH {
                return Err(DicomError::Malformed {
                    tag: header.tag,
                    offset: header.offset,
                    reason: "undefined length in file meta group".to_string(),
                });
            }
            let value = cursor.take(header.length as usize)?;
            if header.tag == TRANSFER_SYNTAX_UID {
                transfer_syntax = Some(text(&bytes[value]));
            }
        }

        let transfer_syntax =
            transfer_syntax.ok_or(DicomError::MissingAttribute("TransferSyntaxUID"))?;
        cursor.explicit = match transfer_syntax.as_str() {
            IMPLICIT_VR_LITTLE_ENDIAN => false,
            EXPLICIT_VR_LITTLE_ENDIAN => true,
            other => return Err(DicomError::UnsupportedTransferSyntax(other.to_string())),
        };

        let mut elements = HashMap::new();
        while cursor.remaining() > 0 {
            let header = cursor.header()?;
            if header.length == UNDEFINED_LENGTH {
                cursor.skip_value(&header)?;
                continue;
            }

            let value = cursor.take(header.length as usize)?;
            if header.vr.as_ref() == Some(b"SQ") {
                continue;
            }
            elements.insert(header.tag, Element { value });

            // Nothing after pixel data is needed
            if header.tag == PIXEL_DATA {
                break;
            }
        }

        Ok(Self {
            bytes,
            transfer_syntax,
            elements,
        })
    }

    pub(crate) fn transfer_syntax(&self) -> &str {
        &self.transfer_syntax
    }

    pub(crate) fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    fn value(&self, tag: Tag) -> Option<&[u8]> {
        self.elements
            .get(&tag)
            .map(|element| &self.bytes[element.value.clone()])
    }

    /// First value of an unsigned short (US) element.
    pub(crate) fn u16(&self, tag: Tag, name: &'static str) -> Result<Option<u16>, DicomError> {
        match self.value(tag) {
            None => Ok(None),
            Some(v) if v.len() >= 2 => Ok(Some(u16::from_le_bytes([v[0], v[1]]))),
            Some(v) => Err(DicomError::InvalidAttribute {
                name,
                value: format!("{} byte US value", v.len()),
            }),
        }
    }

    /// Text value with DICOM padding removed.
    pub(crate) fn string(&self, tag: Tag) -> Option<String> {
        self.value(tag).map(text)
    }

    /// Length of the pixel data value in bytes.
    pub(crate) fn pixel_data_len(&self) -> Option<usize> {
        self.elements.get(&PIXEL_DATA).map(|e| e.value.len())
    }

    /// Consume the data set, keeping only the pixel data bytes.
    pub(crate) fn into_pixel_data(self) -> Option<Vec<u8>> {
        let range = self.elements.get(&PIXEL_DATA)?.value.clone();
        let mut bytes = self.bytes;
        bytes.truncate(range.end);
        Some(bytes.split_off(range.start))
    }
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::tags::{NUMBER_OF_FRAMES, ROWS};
    use crate::dicom::test_util::DicomBuilder;

    #[test]
    fn test_parse_explicit_vr() {
        let bytes = DicomBuilder::grayscale16(4, 6, 2, |_, _, _| 7).build();
        let data = DataSet::parse(bytes).unwrap();

        assert_eq!(data.transfer_syntax(), EXPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(data.u16(ROWS, "Rows").unwrap(), Some(4));
        assert_eq!(data.string(NUMBER_OF_FRAMES).as_deref(), Some("2"));
        assert_eq!(data.pixel_data_len(), Some(4 * 6 * 2 * 2));
    }

    #[test]
    fn test_parse_implicit_vr() {
        let bytes = DicomBuilder::grayscale16(3, 3, 1, |_, _, _| 1)
            .implicit()
            .build();
        let data = DataSet::parse(bytes).unwrap();

        assert_eq!(data.transfer_syntax(), IMPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(data.u16(ROWS, "Rows").unwrap(), Some(3));
        assert_eq!(data.into_pixel_data().map(|p| p.len()), Some(18));
    }

    #[test]
    fn test_skips_undefined_length_sequence() {
        for builder in [
            DicomBuilder::grayscale16(2, 2, 1, |_, _, _| 0),
            DicomBuilder::grayscale16(2, 2, 1, |_, _, _| 0).implicit(),
        ] {
            let bytes = builder.with_undefined_length_sequence().build();
            let data = DataSet::parse(bytes).unwrap();
            assert!(data.contains(PIXEL_DATA));
            assert_eq!(data.u16(ROWS, "Rows").unwrap(), Some(2));
        }
    }

    #[test]
    fn test_rejects_missing_magic() {
        let err = DataSet::parse(vec![0u8; 200]).unwrap_err();
        assert!(matches!(err, DicomError::NotDicom));

        let err = DataSet::parse(b"not dicom at all".to_vec()).unwrap_err();
        assert!(matches!(err, DicomError::NotDicom));
    }

    #[test]
    fn test_rejects_unsupported_transfer_syntax() {
        let bytes = DicomBuilder::grayscale16(2, 2, 1, |_, _, _| 0)
            .transfer_syntax("1.2.840.10008.1.2.4.50")
            .build();
        let err = DataSet::parse(bytes).unwrap_err();
        assert!(
            matches!(err, DicomError::UnsupportedTransferSyntax(ref uid) if uid == "1.2.840.10008.1.2.4.50")
        );
    }

    #[test]
    fn test_rejects_encapsulated_pixel_data() {
        let bytes = DicomBuilder::grayscale16(2, 2, 1, |_, _, _| 0)
            .with_encapsulated_pixel_data()
            .build();
        let err = DataSet::parse(bytes).unwrap_err();
        assert!(matches!(err, DicomError::EncapsulatedPixelData));
    }

    #[test]
    fn test_truncated_file() {
        let mut bytes = DicomBuilder::grayscale16(8, 8, 2, |_, _, _| 0).build();
        bytes.truncate(bytes.len() - 10);
        let err = DataSet::parse(bytes).unwrap_err();
        assert!(matches!(err, DicomError::Truncated { .. }));
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag(0x7FE0, 0x0010).to_string(), "(7FE0,0010)");
    }
}
