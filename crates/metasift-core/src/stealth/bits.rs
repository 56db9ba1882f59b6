//! Bit-level payload layout in the alpha channel.
//!
//! One bit per pixel, the alpha LSB, in row-major order:
//! 120-bit signature, 32-bit big-endian payload length in bits, payload.

use std::io::Read;

use flate2::read::GzDecoder;

use super::DecodeError;

pub const SIGNATURE_BITS: usize = 120;
const LENGTH_BITS: usize = 32;
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const MAX_INFLATED_BYTES: u64 = 32 * 1024 * 1024;

/// Pack a 15-byte ASCII signature into its 120-bit pattern, MSB first.
const fn pack_signature(sig: &[u8; 15]) -> u128 {
    let mut out = 0u128;
    let mut i = 0;
    while i < sig.len() {
        out = (out << 8) | sig[i] as u128;
        i += 1;
    }
    out
}

/// Uncompressed UTF-8 payload.
pub const SIGNATURE_TEXT: u128 = pack_signature(b"stealth_pnginfo");
/// Gzip-compressed payload.
pub const SIGNATURE_COMPRESSED: u128 = pack_signature(b"stealth_pngcomp");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Text,
    Compressed,
}

/// Sequential reader over alpha LSBs (one `0`/`1` byte per pixel).
pub struct BitReader<'a> {
    bits: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a [u8]) -> Self {
        Self { bits, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    /// Next `n` bits (n <= 128) as an integer, MSB first.
    pub fn read(&mut self, n: usize) -> Option<u128> {
        let chunk = self.bits.get(self.pos..self.pos.checked_add(n)?)?;
        self.pos += n;
        Some(chunk.iter().fold(0u128, |acc, &b| (acc << 1) | u128::from(b & 1)))
    }

    /// Next `n_bits` packed into bytes, MSB first; a trailing partial byte is dropped.
    pub fn read_bytes(&mut self, n_bits: usize) -> Option<Vec<u8>> {
        let chunk = self.bits.get(self.pos..self.pos.checked_add(n_bits)?)?;
        self.pos += n_bits;
        Some(
            chunk
                .chunks_exact(8)
                .map(|byte| byte.iter().fold(0u8, |acc, &b| (acc << 1) | (b & 1)))
                .collect(),
        )
    }
}

pub fn read_signature(reader: &mut BitReader<'_>) -> Result<Signature, DecodeError> {
    match reader.read(SIGNATURE_BITS) {
        Some(SIGNATURE_TEXT) => Ok(Signature::Text),
        Some(SIGNATURE_COMPRESSED) => Ok(Signature::Compressed),
        Some(_) => Err(DecodeError::SignatureMismatch),
        None => Err(DecodeError::TooFewPixels),
    }
}

/// Decode the length-prefixed payload that follows a matched signature.
pub fn read_payload(reader: &mut BitReader<'_>, signature: Signature) -> Result<String, DecodeError> {
    let declared = reader
        .read(LENGTH_BITS)
        .ok_or(DecodeError::TooFewPixels)? as usize;
    let available = reader.remaining();
    if declared == 0 || declared > available {
        return Err(DecodeError::BadLength {
            declared,
            available,
        });
    }
    let bytes = reader
        .read_bytes(declared)
        .ok_or(DecodeError::TooFewPixels)?;

    if signature == Signature::Compressed || bytes.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .take(MAX_INFLATED_BYTES)
            .read_to_end(&mut out)
            .map_err(DecodeError::Gzip)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    } else {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
