//! PNG files with text chunks, built by hand.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

/// Grey RGB image of `width` × `height` with one `tEXt` chunk before IDAT.
pub fn png_with_text(keyword: &str, text: &str, width: u32, height: u32) -> Vec<u8> {
    let mut out = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut ihdr = width.to_be_bytes().to_vec();
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    out.extend(chunk(b"IHDR", &ihdr));

    let mut text_data = keyword.as_bytes().to_vec();
    text_data.push(0);
    text_data.extend_from_slice(text.as_bytes());
    out.extend(chunk(b"tEXt", &text_data));

    let stride = width as usize * 3;
    let mut raw = Vec::with_capacity((stride + 1) * height as usize);
    for _ in 0..height {
        raw.push(0);
        raw.extend(std::iter::repeat(0x80).take(stride));
    }
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw).unwrap();
    out.extend(chunk(b"IDAT", &enc.finish().unwrap()));
    out.extend(chunk(b"IEND", &[]));
    out
}

/// Filler text that does not compress away: `len` bytes of a repeating prompt.
pub fn prompt_of_len(len: usize) -> String {
    "masterpiece, a cat on a windowsill, Steps: 20, "
        .chars()
        .cycle()
        .take(len)
        .collect()
}
