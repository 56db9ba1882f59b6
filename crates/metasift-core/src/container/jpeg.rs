//! JPEG marker walk: APP1 (EXIF, XMP) and COM segments.

use crate::metadata::{MetadataMap, MetadataValue};

use super::bytes::be_u16;
use super::exif::{read_tiff, EXIF_HEADER};
use super::text::utf8_lossy_trimmed;
use super::{malformed, ParseOutcome};

const MARKER_APP1: u8 = 0xE1;
const MARKER_COM: u8 = 0xFE;
const MARKER_SOS: u8 = 0xDA;
const MARKER_EOI: u8 = 0xD9;

const XMP_NAMESPACE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

pub(crate) fn parse(bytes: &[u8]) -> ParseOutcome {
    let mut map = MetadataMap::new();
    // Past SOI.
    let mut offset = 2usize;

    loop {
        let Some(&lead) = bytes.get(offset) else {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: offset as u64 + 4,
            };
        };
        if lead != 0xFF {
            return ParseOutcome::Failed(malformed(
                "jpeg",
                format!("expected marker at offset {offset}, found 0x{lead:02X}"),
            ));
        }
        // Fill bytes may pad any marker.
        let mut pos = offset + 1;
        while bytes.get(pos) == Some(&0xFF) {
            pos += 1;
        }
        let Some(&marker) = bytes.get(pos) else {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: pos as u64 + 3,
            };
        };
        let segment = pos + 1;

        match marker {
            // Metadata segments precede the entropy-coded scan.
            MARKER_SOS | MARKER_EOI => return ParseOutcome::Complete(map),
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD8 => {
                offset = segment;
                continue;
            }
            _ => {}
        }

        let Some(len) = be_u16(bytes, segment) else {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: segment as u64 + 2,
            };
        };
        if len < 2 {
            return ParseOutcome::Failed(malformed(
                "jpeg",
                format!("segment 0x{marker:02X} declares length {len}"),
            ));
        }
        let end = segment + usize::from(len);
        if end > bytes.len() {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: end as u64,
            };
        }
        let payload = &bytes[segment + 2..end];
        match marker {
            MARKER_APP1 => read_app1(payload, &mut map),
            MARKER_COM => {
                let text = utf8_lossy_trimmed(payload);
                if !text.is_empty() {
                    map.insert("Comment", MetadataValue::from_text(text));
                }
            }
            _ => {}
        }
        offset = end;
    }
}

fn read_app1(payload: &[u8], map: &mut MetadataMap) {
    if let Some(tiff) = payload.strip_prefix(&EXIF_HEADER[..]) {
        if !read_tiff(tiff, map) {
            tracing::debug!("APP1 Exif segment without a valid TIFF header");
        }
    } else if let Some(xmp) = payload.strip_prefix(XMP_NAMESPACE) {
        map.insert("XMP", utf8_lossy_trimmed(xmp));
    }
}
