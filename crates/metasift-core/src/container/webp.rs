//! WebP: RIFF chunk list, `EXIF` and `XMP ` chunks announced by `VP8X`.

use crate::metadata::MetadataMap;

use super::bytes::le_u32;
use super::exif::read_exif_payload;
use super::text::utf8_lossy_trimmed;
use super::{malformed, ParseOutcome};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const VP8X_FLAG_EXIF: u8 = 0x08;
const VP8X_FLAG_XMP: u8 = 0x04;

pub(crate) fn parse(bytes: &[u8]) -> ParseOutcome {
    let Some(riff_size) = le_u32(bytes, 4) else {
        return ParseOutcome::Incomplete {
            suggested_min_bytes: RIFF_HEADER_LEN as u64,
        };
    };
    let riff_end = 8 + u64::from(riff_size);
    let mut map = MetadataMap::new();
    let mut offset = RIFF_HEADER_LEN;
    let mut pending_exif = false;
    let mut pending_xmp = false;

    loop {
        if offset as u64 >= riff_end {
            return ParseOutcome::Complete(map);
        }
        let (Some(fourcc), Some(size)) = (bytes.get(offset..offset + 4), le_u32(bytes, offset + 4))
        else {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: riff_end.max(offset as u64 + CHUNK_HEADER_LEN as u64),
            };
        };
        let data_start = offset + CHUNK_HEADER_LEN;
        let data_end = data_start as u64 + u64::from(size);

        match fourcc {
            // Simple formats carry nothing but the bitstream.
            b"VP8 " | b"VP8L" if offset == RIFF_HEADER_LEN => {
                return ParseOutcome::Complete(map);
            }
            b"VP8X" => {
                let Some(&flags) = bytes.get(data_start) else {
                    return ParseOutcome::Incomplete {
                        suggested_min_bytes: data_start as u64 + 1,
                    };
                };
                pending_exif = flags & VP8X_FLAG_EXIF != 0;
                pending_xmp = flags & VP8X_FLAG_XMP != 0;
                if !pending_exif && !pending_xmp {
                    return ParseOutcome::Complete(map);
                }
            }
            b"EXIF" | b"XMP " => {
                if data_end > bytes.len() as u64 {
                    return ParseOutcome::Incomplete {
                        suggested_min_bytes: data_end,
                    };
                }
                let data = &bytes[data_start..data_end as usize];
                if fourcc == b"EXIF" {
                    if !read_exif_payload(data, &mut map) {
                        tracing::debug!("WebP EXIF chunk without a valid TIFF header");
                    }
                    pending_exif = false;
                } else {
                    map.insert("XMP", utf8_lossy_trimmed(data));
                    pending_xmp = false;
                }
                if !pending_exif && !pending_xmp {
                    return ParseOutcome::Complete(map);
                }
            }
            _ => {}
        }

        // Chunks are padded to an even size.
        let next = data_end + (u64::from(size) & 1);
        if next > riff_end + 1 {
            return ParseOutcome::Failed(malformed(
                "webp",
                format!("chunk at offset {offset} runs past the RIFF end"),
            ));
        }
        offset = match usize::try_from(next) {
            Ok(n) => n,
            Err(_) => {
                return ParseOutcome::Failed(malformed("webp", "chunk offset overflow"));
            }
        };
    }
}
