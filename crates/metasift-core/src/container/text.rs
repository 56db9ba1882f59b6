//! Lossy text decoding shared by the container parsers.

use std::io::Read;

use flate2::read::ZlibDecoder;

/// Inflated text chunks larger than this are truncated.
const MAX_INFLATED_BYTES: u64 = 32 * 1024 * 1024;

/// UTF-8 if valid, otherwise ISO-8859-1 (the PNG `tEXt` encoding).
pub(crate) fn utf8_or_latin1(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => latin1(bytes),
    }
}

pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// UTF-8 with replacement characters; trailing NULs removed.
pub(crate) fn utf8_lossy_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// UTF-16 with replacement characters; trailing NULs removed.
pub(crate) fn utf16_lossy(bytes: &[u8], big_endian: bool) -> String {
    let units = bytes.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect::<String>()
        .trim_end_matches('\0')
        .to_string()
}

/// Inflate a zlib stream (PNG `zTXt` / compressed `iTXt`).
pub(crate) fn inflate_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(MAX_INFLATED_BYTES)
        .read_to_end(&mut out)?;
    Ok(out)
}
