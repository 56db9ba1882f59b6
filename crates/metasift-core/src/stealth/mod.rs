//! Hidden payloads in the alpha channel's least significant bits.
//!
//! Only run on complete PNG bytes with no chunk metadata. Every failure is
//! reported as "nothing hidden"; [`DecodeError`] exists for logging only.

mod bits;

use thiserror::Error;

use crate::cancel::Cancellation;
use crate::metadata::{MetadataMap, MetadataValue};

use bits::{read_payload, read_signature, BitReader};

pub use bits::{SIGNATURE_BITS, SIGNATURE_COMPRESSED, SIGNATURE_TEXT};

/// Key under which a recovered payload is reported.
pub const RESULT_KEY: &str = "stealth_pnginfo";

/// Images smaller than this are skipped.
pub const DEFAULT_MIN_PIXELS: u64 = 250_000;

/// Images larger than this are skipped before any pixel buffer is allocated.
pub const DEFAULT_MAX_PIXELS: u64 = 32 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("png decode: {0}")]
    Png(#[from] png::DecodingError),

    #[error("image has {pixels} pixels, below the {min} pixel minimum")]
    TooSmall { pixels: u64, min: u64 },

    #[error("image has {pixels} pixels, above the {max} pixel maximum")]
    TooLarge { pixels: u64, max: u64 },

    #[error("image has no alpha channel")]
    NoAlpha,

    #[error("not enough pixels for the declared payload")]
    TooFewPixels,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("declared payload of {declared} bits, {available} available")]
    BadLength { declared: usize, available: usize },

    #[error("gzip payload: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct StealthDecoder {
    min_pixels: u64,
    max_pixels: u64,
}

impl Default for StealthDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PIXELS)
    }
}

impl StealthDecoder {
    pub fn new(min_pixels: u64) -> Self {
        Self {
            min_pixels,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// Whether a PNG starting with `head` passes the size gate. Unknown
    /// dimensions count as a pass.
    pub fn may_carry_payload(&self, head: &[u8]) -> bool {
        png_pixel_count(head).map_or(true, |pixels| self.check_size(pixels).is_ok())
    }

    fn check_size(&self, pixels: u64) -> Result<(), DecodeError> {
        if pixels < self.min_pixels {
            return Err(DecodeError::TooSmall {
                pixels,
                min: self.min_pixels,
            });
        }
        if pixels > self.max_pixels {
            return Err(DecodeError::TooLarge {
                pixels,
                max: self.max_pixels,
            });
        }
        Ok(())
    }

    /// Decode from a complete PNG file. `None` when nothing is hidden.
    pub fn decode_png(&self, bytes: &[u8], cancel: &Cancellation) -> Option<MetadataMap> {
        match self.try_decode_png(bytes, cancel) {
            Ok(map) => Some(map),
            Err(
                DecodeError::SignatureMismatch
                | DecodeError::TooSmall { .. }
                | DecodeError::TooLarge { .. }
                | DecodeError::NoAlpha,
            ) => None,
            Err(e) => {
                tracing::debug!(error = %e, "alpha channel decode gave up");
                None
            }
        }
    }

    /// Decode from an RGBA8 pixel buffer (`width * height * 4` bytes).
    pub fn decode_rgba(&self, width: u32, height: u32, rgba: &[u8]) -> Option<MetadataMap> {
        let pixels = u64::from(width) * u64::from(height);
        if self.check_size(pixels).is_err() || rgba.len() as u64 != pixels * 4 {
            return None;
        }
        let alpha: Vec<u8> = rgba.chunks_exact(4).map(|px| px[3] & 1).collect();
        decode_bits(&alpha).ok()
    }

    pub fn try_decode_png(&self, bytes: &[u8], cancel: &Cancellation) -> Result<MetadataMap, DecodeError> {
        // IHDR dimensions are untrusted; reject before the decoder sizes any buffer.
        if let Some(pixels) = png_pixel_count(bytes) {
            self.check_size(pixels)?;
        }
        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info()?;

        let (width, height, interlaced) = {
            let info = reader.info();
            (info.width, info.height, info.interlaced)
        };
        self.check_size(u64::from(width) * u64::from(height))?;
        let channels = match reader.output_color_type().0 {
            png::ColorType::Rgba => 4,
            png::ColorType::GrayscaleAlpha => 2,
            _ => return Err(DecodeError::NoAlpha),
        };

        let mut alpha = Vec::new();
        if interlaced {
            let mut frame = vec![0; reader.output_buffer_size()];
            let info = reader.next_frame(&mut frame)?;
            if cancel.is_cancelled() {
                return Err(DecodeError::Cancelled);
            }
            alpha.extend(alpha_lsbs(&frame[..info.buffer_size()], channels));
        } else {
            while let Some(row) = reader.next_row()? {
                if cancel.is_cancelled() {
                    return Err(DecodeError::Cancelled);
                }
                alpha.extend(alpha_lsbs(row.data(), channels));
            }
        }
        decode_bits(&alpha)
    }
}

/// Width × height from the IHDR chunk, which always follows the signature.
fn png_pixel_count(head: &[u8]) -> Option<u64> {
    if head.get(12..16)? != b"IHDR" {
        return None;
    }
    let dim = |at: usize| -> Option<u64> {
        let b = head.get(at..at + 4)?;
        Some(u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    };
    Some(dim(16)? * dim(20)?)
}

fn alpha_lsbs(data: &[u8], channels: usize) -> impl Iterator<Item = u8> + '_ {
    data.chunks_exact(channels).map(move |px| px[channels - 1] & 1)
}

fn decode_bits(alpha: &[u8]) -> Result<MetadataMap, DecodeError> {
    let mut reader = BitReader::new(alpha);
    let signature = read_signature(&mut reader)?;
    let text = read_payload(&mut reader, signature)?;
    let mut map = MetadataMap::new();
    map.insert(RESULT_KEY, MetadataValue::from_text(text));
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        bits_of, png_chunk, png_rgba, stealth_bits, stealth_png, stealth_rgba, zlib,
    };

    const W: u32 = 500;
    const H: u32 = 500;

    #[test]
    fn plain_payload_from_rgba() {
        let rgba = stealth_rgba(W, H, &stealth_bits("stealth_pnginfo", b"a cat, Steps: 20"));
        let map = StealthDecoder::default().decode_rgba(W, H, &rgba).unwrap();
        assert_eq!(
            map.get(RESULT_KEY).and_then(MetadataValue::as_text),
            Some("a cat, Steps: 20")
        );
    }

    #[test]
    fn compressed_payload_from_png() {
        let png = stealth_png(W, H, "stealth_pngcomp", r#"{"prompt": "a dog"}"#, true);
        let map = StealthDecoder::default()
            .decode_png(&png, &Cancellation::new())
            .unwrap();
        assert_eq!(
            map.get(RESULT_KEY),
            Some(&MetadataValue::Structured(serde_json::json!({"prompt": "a dog"})))
        );
    }

    #[test]
    fn single_flipped_signature_bit_is_no_payload() {
        let clean = stealth_bits("stealth_pnginfo", b"hidden");
        for i in [0, 7, 59, 119] {
            let mut bits = clean.clone();
            bits[i] ^= 1;
            let rgba = stealth_rgba(W, H, &bits);
            assert!(StealthDecoder::default().decode_rgba(W, H, &rgba).is_none(), "bit {i}");
        }
    }

    #[test]
    fn small_images_are_skipped() {
        let rgba = stealth_rgba(100, 100, &stealth_bits("stealth_pnginfo", b"x"));
        assert!(StealthDecoder::default().decode_rgba(100, 100, &rgba).is_none());
        assert!(StealthDecoder::new(0).decode_rgba(100, 100, &rgba).is_some());

        let png = stealth_png(100, 100, "stealth_pnginfo", "x", false);
        assert!(matches!(
            StealthDecoder::default().try_decode_png(&png, &Cancellation::new()),
            Err(DecodeError::TooSmall { .. })
        ));
    }

    #[test]
    fn size_gate_reads_ihdr() {
        let small = stealth_png(100, 100, "stealth_pnginfo", "x", false);
        let large = stealth_png(W, H, "stealth_pnginfo", "x", false);
        let decoder = StealthDecoder::default();
        assert!(!decoder.may_carry_payload(&small[..64]));
        assert!(decoder.may_carry_payload(&large[..64]));
        assert!(decoder.may_carry_payload(&large[..10]));
    }

    #[test]
    fn cancelled_decode_stops() {
        let png = stealth_png(W, H, "stealth_pnginfo", "x", false);
        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(matches!(
            StealthDecoder::default().try_decode_png(&png, &cancel),
            Err(DecodeError::Cancelled)
        ));
    }

    #[test]
    fn truncated_png_is_no_payload() {
        let png = stealth_png(W, H, "stealth_pnginfo", "x", false);
        assert!(StealthDecoder::default()
            .decode_png(&png[..png.len() / 2], &Cancellation::new())
            .is_none());
    }

    /// Signature, then a raw 32-bit length field, then `payload`.
    fn bits_with_length(declared_bits: u32, payload: &[u8]) -> Vec<u8> {
        let mut bits: Vec<u8> = bits_of(b"stealth_pnginfo").collect();
        bits.extend(bits_of(&declared_bits.to_be_bytes()));
        bits.extend(bits_of(payload));
        bits
    }

    #[test]
    fn huge_ihdr_on_tiny_file_is_rejected_without_allocating() {
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let mut ihdr = 1_000_000u32.to_be_bytes().to_vec();
        ihdr.extend_from_slice(&1_000_000u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
        png.extend(png_chunk(b"IHDR", &ihdr));
        png.extend(png_chunk(b"IDAT", &zlib(&[0; 16])));
        png.extend(png_chunk(b"IEND", &[]));
        assert!(png.len() < 100);

        let decoder = StealthDecoder::default();
        assert!(!decoder.may_carry_payload(&png));
        assert!(matches!(
            decoder.try_decode_png(&png, &Cancellation::new()),
            Err(DecodeError::TooLarge { .. })
        ));
        assert!(decoder.decode_png(&png, &Cancellation::new()).is_none());
    }

    #[test]
    fn pixel_ceiling_is_configurable() {
        let png = stealth_png(W, H, "stealth_pnginfo", "x", false);
        let decoder = StealthDecoder::default().with_max_pixels(100_000);
        assert!(!decoder.may_carry_payload(&png));
        assert!(matches!(
            StealthDecoder::new(0)
                .with_max_pixels(100_000)
                .try_decode_png(&png, &Cancellation::new()),
            Err(DecodeError::TooLarge { .. })
        ));
    }

    #[test]
    fn zero_length_prefix_is_no_payload() {
        let rgba = stealth_rgba(W, H, &bits_with_length(0, b"ignored"));
        let png = png_rgba(W, H, &rgba, &[]);
        let decoder = StealthDecoder::default();
        assert!(matches!(
            decoder.try_decode_png(&png, &Cancellation::new()),
            Err(DecodeError::BadLength { declared: 0, .. })
        ));
        assert!(decoder.decode_png(&png, &Cancellation::new()).is_none());
    }

    #[test]
    fn overlong_length_prefix_is_no_payload() {
        let pixels = W * H;
        let rgba = stealth_rgba(W, H, &bits_with_length(pixels, b"short"));
        let png = png_rgba(W, H, &rgba, &[]);
        let decoder = StealthDecoder::default();
        assert!(matches!(
            decoder.try_decode_png(&png, &Cancellation::new()),
            Err(DecodeError::BadLength { .. })
        ));
        assert!(decoder.decode_png(&png, &Cancellation::new()).is_none());
    }

    #[test]
    fn malformed_ihdr_is_no_payload() {
        let mut png = stealth_png(W, H, "stealth_pnginfo", "x", false);
        // Corrupt the IHDR colour type; the chunk CRC no longer matches either.
        png[25] = 7;
        assert!(StealthDecoder::default()
            .decode_png(&png, &Cancellation::new())
            .is_none());
    }
}
