//! EXIF (TIFF IFD) reader shared by JPEG, WebP and AVIF.
//!
//! Only a handful of text tags are reported. The walk is best effort: an
//! entry pointing outside the blob is skipped, never fatal.

use crate::metadata::{MetadataMap, MetadataValue};

use super::text::{utf16_lossy, utf8_lossy_trimmed};

const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_SOFTWARE: u16 = 0x0131;
const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_USER_COMMENT: u16 = 0x9286;

/// Upper bound on IFD entries read from one directory.
const MAX_IFD_ENTRIES: u16 = 512;

/// `Exif\0\0` header that precedes the TIFF stream in JPEG APP1 and
/// (sometimes) in WebP/AVIF payloads.
pub(crate) const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

#[derive(Debug, Clone, Copy)]
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    /// Offset (within the TIFF stream) of the entry's 4-byte value field.
    value_field: usize,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..4)? {
            [b'M', b'M', 0x00, 0x2A] => true,
            [b'I', b'I', 0x2A, 0x00] => false,
            _ => return None,
        };
        Some(Self { data, big_endian })
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let b = self.data.get(at..at.checked_add(2)?)?;
        Some(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let b = self.data.get(at..at.checked_add(4)?)?;
        Some(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn entries(&self, ifd_offset: usize) -> Vec<IfdEntry> {
        let Some(count) = self.u16(ifd_offset) else {
            return Vec::new();
        };
        (0..count.min(MAX_IFD_ENTRIES))
            .filter_map(|i| {
                let at = ifd_offset + 2 + usize::from(i) * 12;
                Some(IfdEntry {
                    tag: self.u16(at)?,
                    field_type: self.u16(at + 2)?,
                    count: self.u32(at + 4)?,
                    value_field: at + 8,
                })
            })
            .collect()
    }

    /// Raw value bytes: inline when they fit in 4 bytes, else at the stored offset.
    fn value_bytes(&self, entry: &IfdEntry) -> Option<&'a [u8]> {
        let len = type_size(entry.field_type)?.checked_mul(entry.count as usize)?;
        let start = if len <= 4 {
            entry.value_field
        } else {
            self.u32(entry.value_field)? as usize
        };
        self.data.get(start..start.checked_add(len)?)
    }
}

fn type_size(field_type: u16) -> Option<usize> {
    match field_type {
        1 | 2 | 6 | 7 => Some(1),
        3 | 8 => Some(2),
        4 | 9 | 11 => Some(4),
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Read the reported tags from a TIFF stream into `map`.
/// Returns false when the stream has no valid TIFF header.
pub(crate) fn read_tiff(data: &[u8], map: &mut MetadataMap) -> bool {
    let Some(tiff) = Tiff::new(data) else {
        return false;
    };
    let Some(ifd0) = tiff.u32(4) else {
        return false;
    };

    let mut exif_ifd = None;
    for entry in tiff.entries(ifd0 as usize) {
        match entry.tag {
            TAG_IMAGE_DESCRIPTION | TAG_MAKE | TAG_MODEL | TAG_SOFTWARE => {
                if let Some(raw) = tiff.value_bytes(&entry) {
                    let text = utf8_lossy_trimmed(raw);
                    if !text.is_empty() {
                        map.insert(tag_name(entry.tag), text);
                    }
                }
            }
            TAG_EXIF_IFD => exif_ifd = tiff.u32(entry.value_field),
            _ => {}
        }
    }

    if let Some(offset) = exif_ifd {
        for entry in tiff.entries(offset as usize) {
            if entry.tag == TAG_USER_COMMENT {
                if let Some(raw) = tiff.value_bytes(&entry) {
                    let text = decode_user_comment(raw, tiff.big_endian);
                    if !text.is_empty() {
                        map.insert("UserComment", MetadataValue::from_text(text));
                    }
                }
            }
        }
    }
    true
}

/// Read an EXIF payload that may or may not start with `Exif\0\0`.
pub(crate) fn read_exif_payload(payload: &[u8], map: &mut MetadataMap) -> bool {
    let tiff = payload.strip_prefix(&EXIF_HEADER[..]).unwrap_or(payload);
    read_tiff(tiff, map)
}

fn tag_name(tag: u16) -> &'static str {
    match tag {
        TAG_IMAGE_DESCRIPTION => "ImageDescription",
        TAG_MAKE => "Make",
        TAG_MODEL => "Model",
        TAG_SOFTWARE => "Software",
        TAG_USER_COMMENT => "UserComment",
        _ => "Unknown",
    }
}

/// Decode an EXIF `UserComment` from its 8-byte character-code prefix.
///
/// `UNICODE` payloads carry no byte order of their own; a BOM wins, then the
/// position of zero bytes, then the TIFF byte order.
pub(crate) fn decode_user_comment(raw: &[u8], tiff_big_endian: bool) -> String {
    if raw.len() < 8 {
        return utf8_lossy_trimmed(raw);
    }
    let (prefix, body) = raw.split_at(8);
    match prefix {
        b"UNICODE\0" => decode_unicode_comment(body, tiff_big_endian),
        // ASCII, JIS and undefined (all zero) prefixes: best-effort UTF-8.
        _ => utf8_lossy_trimmed(body),
    }
}

fn decode_unicode_comment(body: &[u8], tiff_big_endian: bool) -> String {
    match body {
        [0xFE, 0xFF, rest @ ..] => return utf16_lossy(rest, true),
        [0xFF, 0xFE, rest @ ..] => return utf16_lossy(rest, false),
        _ => {}
    }
    let even_zeros = body.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_zeros = body.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let big_endian = match even_zeros.cmp(&odd_zeros) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => tiff_big_endian,
    };
    utf16_lossy(body, big_endian)
}
