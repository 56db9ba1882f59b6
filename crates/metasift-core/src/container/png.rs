//! PNG text chunks (`tEXt`, `zTXt`, `iTXt`).

use crate::metadata::{MetadataMap, MetadataValue};

use super::bytes::be_u32;
use super::text::{inflate_zlib, latin1, utf8_lossy_trimmed, utf8_or_latin1};
use super::ParseOutcome;

/// Length + type + CRC around every chunk payload.
const CHUNK_OVERHEAD: u64 = 12;
const FIRST_CHUNK_OFFSET: usize = 8;

pub(crate) fn parse(bytes: &[u8]) -> ParseOutcome {
    let mut map = MetadataMap::new();
    let mut offset = FIRST_CHUNK_OFFSET;

    loop {
        let (Some(len), Some(kind)) = (be_u32(bytes, offset), bytes.get(offset + 4..offset + 8))
        else {
            return truncated(offset as u64, 0);
        };
        if kind == b"IEND" {
            return ParseOutcome::Complete(map);
        }

        let data_start = offset + 8;
        let end = data_start as u64 + u64::from(len) + 4;
        if end > bytes.len() as u64 {
            return truncated(offset as u64, u64::from(len));
        }
        let data = &bytes[data_start..data_start + len as usize];
        match kind {
            b"tEXt" => read_text(data, &mut map),
            b"zTXt" => read_ztxt(data, &mut map),
            b"iTXt" => read_itxt(data, &mut map),
            _ => {}
        }
        offset = end as usize;
    }
}

/// The buffer ends inside the chunk at `offset`. Text chunks may follow the
/// image data, so nothing short of IEND is a final answer.
fn truncated(offset: u64, claimed_len: u64) -> ParseOutcome {
    ParseOutcome::Incomplete {
        suggested_min_bytes: (offset + claimed_len + CHUNK_OVERHEAD).saturating_mul(2),
    }
}

fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    let keyword = latin1(&data[..nul]);
    if keyword.is_empty() {
        return None;
    }
    Some((keyword, &data[nul + 1..]))
}

fn read_text(data: &[u8], map: &mut MetadataMap) {
    if let Some((keyword, text)) = split_keyword(data) {
        map.insert(keyword, MetadataValue::from_text(utf8_or_latin1(text)));
    }
}

fn read_ztxt(data: &[u8], map: &mut MetadataMap) {
    let Some((keyword, rest)) = split_keyword(data) else {
        return;
    };
    // Compression method byte, then the zlib stream.
    let Some(compressed) = rest.get(1..) else {
        return;
    };
    match inflate_zlib(compressed) {
        Ok(raw) => map.insert(keyword, MetadataValue::from_text(utf8_or_latin1(&raw))),
        Err(e) => {
            tracing::debug!(%keyword, error = %e, "zTXt inflate failed, keeping raw payload");
            map.insert(keyword, MetadataValue::Blob(compressed.to_vec()));
        }
    }
}

fn read_itxt(data: &[u8], map: &mut MetadataMap) {
    let Some((keyword, rest)) = split_keyword(data) else {
        return;
    };
    let (Some(&compressed_flag), Some(_method)) = (rest.first(), rest.get(1)) else {
        return;
    };
    // Language tag and translated keyword, both NUL-terminated.
    let Some(after_lang) = rest
        .get(2..)
        .and_then(|r| r.iter().position(|&b| b == 0).map(|n| &r[n + 1..]))
    else {
        return;
    };
    let Some(text) = after_lang
        .iter()
        .position(|&b| b == 0)
        .map(|n| &after_lang[n + 1..])
    else {
        return;
    };

    if compressed_flag == 1 {
        match inflate_zlib(text) {
            Ok(raw) => map.insert(keyword, MetadataValue::from_text(utf8_lossy_trimmed(&raw))),
            Err(e) => {
                tracing::debug!(%keyword, error = %e, "iTXt inflate failed, keeping raw payload");
                map.insert(keyword, MetadataValue::Blob(text.to_vec()));
            }
        }
    } else {
        map.insert(keyword, MetadataValue::from_text(utf8_lossy_trimmed(text)));
    }
}
