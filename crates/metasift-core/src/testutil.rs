//! Fixture builders shared by unit tests.

use std::io::Write;

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::{Compression, Crc};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

// ---- PNG ----

pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

pub fn text_chunk(keyword: &str, text: &str) -> Vec<u8> {
    let mut data = keyword.as_bytes().to_vec();
    data.push(0);
    data.extend_from_slice(text.as_bytes());
    png_chunk(b"tEXt", &data)
}

pub fn ztxt(keyword: &str, text: &str) -> Vec<u8> {
    let mut data = keyword.as_bytes().to_vec();
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(&zlib(text.as_bytes()));
    png_chunk(b"zTXt", &data)
}

pub fn itxt(keyword: &str, text: &str, compressed: bool) -> Vec<u8> {
    let mut data = keyword.as_bytes().to_vec();
    data.extend_from_slice(&[0, u8::from(compressed), 0]);
    data.extend_from_slice(b"en\0");
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    if compressed {
        data.extend_from_slice(&zlib(text.as_bytes()));
    } else {
        data.extend_from_slice(text.as_bytes());
    }
    png_chunk(b"iTXt", &data)
}

/// RGBA8 PNG; `chunks` go right after IHDR.
pub fn png_rgba(width: u32, height: u32, rgba: &[u8], chunks: &[Vec<u8>]) -> Vec<u8> {
    assert_eq!(rgba.len(), width as usize * height as usize * 4);
    let mut out = PNG_SIGNATURE.to_vec();
    let mut ihdr = width.to_be_bytes().to_vec();
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
    out.extend(png_chunk(b"IHDR", &ihdr));
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    let stride = width as usize * 4;
    let mut raw = Vec::with_capacity((stride + 1) * height as usize);
    for row in rgba.chunks_exact(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    out.extend(png_chunk(b"IDAT", &zlib(&raw)));
    out.extend(png_chunk(b"IEND", &[]));
    out
}

/// Opaque gradient image with `chunks` after IHDR.
pub fn png_with_chunks(chunks: &[Vec<u8>], width: u32, height: u32) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            rgba.extend_from_slice(&[(x * 7) as u8, (y * 13) as u8, (x ^ y) as u8, 255]);
        }
    }
    png_rgba(width, height, &rgba, chunks)
}

/// Opaque pixels that do not compress, so IDAT stays about `4 * w * h` bytes.
pub fn noise_rgba(width: u32, height: u32) -> Vec<u8> {
    let mut state = 0x2545_F491u32;
    (0..width as usize * height as usize)
        .flat_map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            [r, g, b, 255]
        })
        .collect()
}

/// `early` chunks after IHDR, `late` chunks between IDAT and IEND.
pub fn png_with_late_chunks(
    width: u32,
    height: u32,
    rgba: &[u8],
    early: &[Vec<u8>],
    late: &[Vec<u8>],
) -> Vec<u8> {
    let mut png = png_rgba(width, height, rgba, early);
    png.truncate(png.len() - 12);
    for chunk in late {
        png.extend_from_slice(chunk);
    }
    png.extend(png_chunk(b"IEND", &[]));
    png
}

// ---- EXIF / TIFF ----

pub fn user_comment_unicode_be(text: &str) -> Vec<u8> {
    let mut raw = b"UNICODE\0".to_vec();
    raw.extend(text.encode_utf16().flat_map(|u| u.to_be_bytes()));
    raw
}

/// TIFF stream: IFD0 at 8 pointing to an Exif IFD at 26 holding one
/// `UserComment` whose bytes start at 44.
pub fn tiff_with_user_comment(comment: &[u8], big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32b = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

    let mut out = if big_endian {
        b"MM\0\x2A".to_vec()
    } else {
        b"II\x2A\0".to_vec()
    };
    out.extend_from_slice(&u32b(8));

    // IFD0: Exif IFD pointer.
    out.extend_from_slice(&u16b(1));
    out.extend_from_slice(&u16b(0x8769));
    out.extend_from_slice(&u16b(4));
    out.extend_from_slice(&u32b(1));
    out.extend_from_slice(&u32b(26));
    out.extend_from_slice(&u32b(0));

    // Exif IFD: UserComment (UNDEFINED).
    out.extend_from_slice(&u16b(1));
    out.extend_from_slice(&u16b(0x9286));
    out.extend_from_slice(&u16b(7));
    out.extend_from_slice(&u32b(comment.len() as u32));
    if comment.len() <= 4 {
        let mut inline = [0u8; 4];
        inline[..comment.len()].copy_from_slice(comment);
        out.extend_from_slice(&inline);
    } else {
        out.extend_from_slice(&u32b(44));
    }
    out.extend_from_slice(&u32b(0));
    assert_eq!(out.len(), 44);

    if comment.len() > 4 {
        out.extend_from_slice(comment);
    }
    out
}

// ---- JPEG ----

pub fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn jpeg_exif_segment(comment: &str) -> Vec<u8> {
    let mut payload = b"Exif\0\0".to_vec();
    payload.extend(tiff_with_user_comment(&user_comment_unicode_be(comment), true));
    jpeg_segment(0xE1, &payload)
}

/// SOI, `segments`, then a short scan and EOI.
pub fn jpeg_with_segments(segments: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    for seg in segments {
        out.extend_from_slice(seg);
    }
    out.extend(jpeg_segment(0xDA, &[1, 1, 0, 0, 63, 0]));
    out.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

// ---- WebP ----

fn riff_chunk(fourcc: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = fourcc.to_vec();
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    out
}

fn riff_webp(chunks: Vec<Vec<u8>>) -> Vec<u8> {
    let body: Vec<u8> = chunks.concat();
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((body.len() + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    out.extend(body);
    out
}

pub fn webp_simple() -> Vec<u8> {
    riff_webp(vec![riff_chunk(b"VP8L", &[0x2F, 0, 0, 0, 0])])
}

/// VP8X file whose flags announce exactly the chunks given.
pub fn webp_extended(exif: Option<&[u8]>, xmp: Option<&str>) -> Vec<u8> {
    let mut flags = 0u8;
    if exif.is_some() {
        flags |= 0x08;
    }
    if xmp.is_some() {
        flags |= 0x04;
    }
    let mut vp8x = vec![flags, 0, 0, 0];
    vp8x.extend_from_slice(&[15, 0, 0, 15, 0, 0]);
    let mut chunks = vec![riff_chunk(b"VP8X", &vp8x), riff_chunk(b"VP8 ", &[0u8; 20])];
    if let Some(exif) = exif {
        chunks.push(riff_chunk(b"EXIF", exif));
    }
    if let Some(xmp) = xmp {
        chunks.push(riff_chunk(b"XMP ", xmp.as_bytes()));
    }
    riff_webp(chunks)
}

// ---- AVIF ----

fn bmff_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

fn infe(item_id: u16, item_type: &[u8; 4]) -> Vec<u8> {
    let mut body = vec![2, 0, 0, 0];
    body.extend_from_slice(&item_id.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(item_type);
    body.push(0);
    bmff_box(b"infe", &body)
}

/// ftyp, meta (hdlr, iinf, iloc, optional idat), mdat.
///
/// The `Exif` item payload is `[0, 0, 0, 6] Exif\0\0 <tiff>`, stored in
/// `mdat` (construction method 0) or in `idat` (method 1).
pub fn avif_with_exif(tiff: Option<&[u8]>, in_idat: bool) -> Vec<u8> {
    const AV01_LEN: usize = 32;
    let mut ftyp = b"avif".to_vec();
    ftyp.extend_from_slice(&0u32.to_be_bytes());
    ftyp.extend_from_slice(b"mif1");
    let ftyp = bmff_box(b"ftyp", &ftyp);

    let exif_payload = tiff.map(|tiff| {
        let mut p = 6u32.to_be_bytes().to_vec();
        p.extend_from_slice(b"Exif\0\0");
        p.extend_from_slice(tiff);
        p
    });

    let build_meta = |av01_offset: u32, exif_offset: u32| -> Vec<u8> {
        let mut hdlr = vec![0u8; 8];
        hdlr.extend_from_slice(b"pict");
        hdlr.extend_from_slice(&[0u8; 13]);

        let mut iinf = vec![0, 0, 0, 0];
        let count: u16 = if exif_payload.is_some() { 2 } else { 1 };
        iinf.extend_from_slice(&count.to_be_bytes());
        iinf.extend(infe(1, b"av01"));
        if exif_payload.is_some() {
            iinf.extend(infe(2, b"Exif"));
        }

        // Version 1, 4-byte offsets and lengths, no base offset or index.
        let mut iloc = vec![1, 0, 0, 0, 0x44, 0x00];
        iloc.extend_from_slice(&count.to_be_bytes());
        let mut item = |id: u16, method: u16, offset: u32, len: u32| {
            iloc.extend_from_slice(&id.to_be_bytes());
            iloc.extend_from_slice(&method.to_be_bytes());
            iloc.extend_from_slice(&0u16.to_be_bytes());
            iloc.extend_from_slice(&1u16.to_be_bytes());
            iloc.extend_from_slice(&offset.to_be_bytes());
            iloc.extend_from_slice(&len.to_be_bytes());
        };
        item(1, 0, av01_offset, AV01_LEN as u32);
        if let Some(payload) = &exif_payload {
            item(2, u16::from(in_idat), exif_offset, payload.len() as u32);
        }

        let mut meta = vec![0, 0, 0, 0];
        meta.extend(bmff_box(b"hdlr", &hdlr));
        meta.extend(bmff_box(b"iinf", &iinf));
        meta.extend(bmff_box(b"iloc", &iloc));
        if let (true, Some(payload)) = (in_idat, &exif_payload) {
            meta.extend(bmff_box(b"idat", payload));
        }
        bmff_box(b"meta", &meta)
    };

    let meta_len = build_meta(0, 0).len();
    let mdat_data = ftyp.len() + meta_len + 8;
    let exif_offset = if in_idat { 0 } else { mdat_data + AV01_LEN };
    let meta = build_meta(mdat_data as u32, exif_offset as u32);

    let mut mdat = vec![0xAAu8; AV01_LEN];
    if let (false, Some(payload)) = (in_idat, &exif_payload) {
        mdat.extend_from_slice(payload);
    }
    let mut out = ftyp;
    out.extend(meta);
    out.extend(bmff_box(b"mdat", &mdat));
    out
}

// ---- Tensor archive ----

pub fn tensor_archive(header_json: &str, data_len: usize) -> Vec<u8> {
    let mut out = (header_json.len() as u64).to_le_bytes().to_vec();
    out.extend_from_slice(header_json.as_bytes());
    out.extend(std::iter::repeat(0u8).take(data_len));
    out
}

// ---- Alpha-channel payloads ----

pub fn bits_of(bytes: &[u8]) -> impl Iterator<Item = u8> + '_ {
    bytes.iter().flat_map(|b| (0..8).rev().map(move |i| (b >> i) & 1))
}

/// Signature, 32-bit payload length in bits, payload; one bit per entry.
pub fn stealth_bits(signature: &str, payload: &[u8]) -> Vec<u8> {
    let mut bits: Vec<u8> = bits_of(signature.as_bytes()).collect();
    bits.extend(bits_of(&((payload.len() * 8) as u32).to_be_bytes()));
    bits.extend(bits_of(payload));
    bits
}

/// RGBA pixels whose alpha LSBs carry `bits` in row-major order.
pub fn stealth_rgba(width: u32, height: u32, bits: &[u8]) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    assert!(bits.len() <= pixels);
    (0..pixels)
        .flat_map(|i| {
            let bit = bits.get(i).copied().unwrap_or(1);
            [(i % 251) as u8, (i % 241) as u8, 90, 254 | bit]
        })
        .collect()
}

pub fn stealth_png(width: u32, height: u32, signature: &str, text: &str, compress: bool) -> Vec<u8> {
    let payload = if compress {
        gzip(text.as_bytes())
    } else {
        text.as_bytes().to_vec()
    };
    let rgba = stealth_rgba(width, height, &stealth_bits(signature, &payload));
    png_rgba(width, height, &rgba, &[])
}
