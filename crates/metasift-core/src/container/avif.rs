//! AVIF (ISO-BMFF / HEIF): locate the `Exif` item through `meta`.
//!
//! Top-level boxes are skipped by header until `meta`, which must be held in
//! full. The item-info table names the `Exif` item and the item-location table
//! says where its bytes live: in the file (construction method 0) or inside
//! the `idat` box (method 1).

use crate::metadata::MetadataMap;

use super::bytes::{be_u32, BeCursor};
use super::exif::read_exif_payload;
use super::{malformed, ParseOutcome};

const MAX_ITEMS: u32 = 4096;
const MAX_EXTENTS: u16 = 64;

#[derive(Debug, Clone, Copy)]
struct BoxHeader {
    kind: [u8; 4],
    header_len: u64,
    /// Total box size; `None` when the box runs to end of file.
    size: Option<u64>,
}

fn box_header(buf: &[u8], at: usize) -> Option<BoxHeader> {
    let size32 = be_u32(buf, at)?;
    let kind: [u8; 4] = buf.get(at + 4..at + 8)?.try_into().ok()?;
    match size32 {
        0 => Some(BoxHeader {
            kind,
            header_len: 8,
            size: None,
        }),
        1 => {
            let mut c = BeCursor::new(buf.get(at + 8..)?);
            let large = c.sized(8)?;
            Some(BoxHeader {
                kind,
                header_len: 16,
                size: Some(large),
            })
        }
        n => Some(BoxHeader {
            kind,
            header_len: 8,
            size: Some(u64::from(n)),
        }),
    }
}

/// Child boxes of a fully held body; stops at the first malformed header.
fn children(body: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut at = 0usize;
    std::iter::from_fn(move || {
        let header = box_header(body, at)?;
        let end = match header.size {
            Some(size) if size >= header.header_len => usize::try_from(size).ok()?.checked_add(at)?,
            Some(_) => return None,
            None => body.len(),
        };
        let start = at + header.header_len as usize;
        let content = body.get(start..end)?;
        at = end;
        Some((header.kind, content))
    })
}

pub(crate) fn parse(bytes: &[u8]) -> ParseOutcome {
    let mut offset = 0usize;
    loop {
        let Some(header) = box_header(bytes, offset) else {
            return ParseOutcome::Incomplete {
                suggested_min_bytes: offset as u64 + 16,
            };
        };
        let box_end = match header.size {
            Some(size) if size < header.header_len => {
                return ParseOutcome::Failed(malformed(
                    "avif",
                    format!("box at offset {offset} declares size {size}"),
                ));
            }
            Some(size) => offset as u64 + size,
            None => bytes.len() as u64,
        };

        if &header.kind == b"meta" {
            if box_end > bytes.len() as u64 {
                return ParseOutcome::Incomplete {
                    suggested_min_bytes: box_end,
                };
            }
            let body = &bytes[offset + header.header_len as usize..box_end as usize];
            return read_meta(bytes, body);
        }
        if header.size.is_none() {
            // Last box and still no `meta`.
            return ParseOutcome::Complete(MetadataMap::new());
        }
        offset = match usize::try_from(box_end) {
            Ok(n) => n,
            Err(_) => return ParseOutcome::Failed(malformed("avif", "box offset overflow")),
        };
    }
}

#[derive(Debug, Default)]
struct Location {
    construction_method: u8,
    base_offset: u64,
    extents: Vec<(u64, u64)>,
}

fn read_meta(file: &[u8], meta: &[u8]) -> ParseOutcome {
    // FullBox version and flags.
    let Some(body) = meta.get(4..) else {
        return ParseOutcome::Failed(malformed("avif", "meta box too short"));
    };

    let mut exif_item = None;
    let mut locations = Vec::new();
    let mut idat: &[u8] = &[];
    for (kind, content) in children(body) {
        match &kind {
            b"iinf" => exif_item = find_exif_item(content),
            b"iloc" => match read_iloc(content) {
                Some(locs) => locations = locs,
                None => return ParseOutcome::Failed(malformed("avif", "unreadable iloc box")),
            },
            b"idat" => idat = content,
            _ => {}
        }
    }

    let Some(item_id) = exif_item else {
        return ParseOutcome::Complete(MetadataMap::new());
    };
    let Some(location) = locations
        .into_iter()
        .find_map(|(id, loc)| (id == item_id).then_some(loc))
    else {
        return ParseOutcome::Failed(malformed("avif", format!("Exif item {item_id} has no location")));
    };

    let payload = match gather_extents(file, idat, &location) {
        Ok(payload) => payload,
        Err(outcome) => return outcome,
    };
    let mut map = MetadataMap::new();
    // 4-byte offset from the end of this field to the TIFF header.
    let tiff_offset = be_u32(&payload, 0).map(|n| n as usize);
    match tiff_offset.and_then(|n| payload.get(4usize.checked_add(n)?..)) {
        Some(tiff) => {
            if !read_exif_payload(tiff, &mut map) {
                tracing::debug!("AVIF Exif item without a valid TIFF header");
            }
            ParseOutcome::Complete(map)
        }
        None => ParseOutcome::Failed(malformed("avif", "Exif item shorter than its header offset")),
    }
}

fn gather_extents(file: &[u8], idat: &[u8], location: &Location) -> Result<Vec<u8>, ParseOutcome> {
    let source = match location.construction_method {
        0 => file,
        1 => idat,
        m => {
            return Err(ParseOutcome::Failed(malformed(
                "avif",
                format!("construction method {m}"),
            )))
        }
    };
    let mut payload = Vec::new();
    for &(extent_offset, extent_len) in &location.extents {
        let start = location.base_offset.saturating_add(extent_offset);
        let end = start.saturating_add(extent_len);
        if extent_len == 0 {
            return Err(ParseOutcome::Failed(malformed("avif", "open-ended Exif extent")));
        }
        if end > source.len() as u64 {
            if location.construction_method == 0 {
                return Err(ParseOutcome::Incomplete {
                    suggested_min_bytes: end,
                });
            }
            return Err(ParseOutcome::Failed(malformed("avif", "extent outside idat")));
        }
        payload.extend_from_slice(&source[start as usize..end as usize]);
    }
    Ok(payload)
}

fn find_exif_item(iinf: &[u8]) -> Option<u32> {
    let mut c = BeCursor::new(iinf);
    let version = c.u8()?;
    c.take(3)?;
    let _entry_count = if version == 0 {
        u32::from(c.u16()?)
    } else {
        c.u32()?
    };
    let entries = iinf.get(c.position()..)?;
    children(entries)
        .filter(|(kind, _)| kind == b"infe")
        .find_map(|(_, infe)| {
            let mut c = BeCursor::new(infe);
            let version = c.u8()?;
            c.take(3)?;
            let item_id = match version {
                2 => u32::from(c.u16()?),
                3 => c.u32()?,
                _ => return None,
            };
            c.u16()?; // protection index
            (c.take(4)? == b"Exif").then_some(item_id)
        })
}

fn read_iloc(iloc: &[u8]) -> Option<Vec<(u32, Location)>> {
    let mut c = BeCursor::new(iloc);
    let version = c.u8()?;
    c.take(3)?;
    let sizes = c.u8()?;
    let (offset_size, length_size) = (sizes >> 4, sizes & 0x0F);
    let sizes = c.u8()?;
    let base_offset_size = sizes >> 4;
    let index_size = if version == 0 { 0 } else { sizes & 0x0F };
    let item_count = if version < 2 {
        u32::from(c.u16()?)
    } else {
        c.u32()?
    };
    if item_count > MAX_ITEMS {
        return None;
    }

    let mut out = Vec::with_capacity(item_count as usize);
    for _ in 0..item_count {
        let item_id = if version < 2 {
            u32::from(c.u16()?)
        } else {
            c.u32()?
        };
        let construction_method = if version == 0 {
            0
        } else {
            (c.u16()? & 0x0F) as u8
        };
        c.u16()?; // data reference index
        let base_offset = c.sized(base_offset_size)?;
        let extent_count = c.u16()?;
        if extent_count > MAX_EXTENTS {
            return None;
        }
        let mut extents = Vec::with_capacity(usize::from(extent_count));
        for _ in 0..extent_count {
            c.sized(index_size)?;
            let offset = c.sized(offset_size)?;
            let length = c.sized(length_size)?;
            extents.push((offset, length));
        }
        out.push((
            item_id,
            Location {
                construction_method,
                base_offset,
                extents,
            },
        ));
    }
    Some(out)
}
