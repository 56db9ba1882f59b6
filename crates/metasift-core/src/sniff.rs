//! Container detection from leading magic bytes.

use serde::{Deserialize, Serialize};

/// Bytes needed to tell every supported container apart.
pub const SNIFF_LEN: usize = 16;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const AVIF_BRANDS: [&[u8; 4]; 2] = [b"avif", b"avis"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Png,
    Jpeg,
    WebP,
    Avif,
    TensorArchive,
    Unknown,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerKind::Png => "png",
            ContainerKind::Jpeg => "jpeg",
            ContainerKind::WebP => "webp",
            ContainerKind::Avif => "avif",
            ContainerKind::TensorArchive => "tensor_archive",
            ContainerKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "png" => ContainerKind::Png,
            "jpeg" => ContainerKind::Jpeg,
            "webp" => ContainerKind::WebP,
            "avif" => ContainerKind::Avif,
            "tensor_archive" => ContainerKind::TensorArchive,
            _ => ContainerKind::Unknown,
        }
    }
}

/// Identify the container from the first bytes of `bytes`. Never fails.
pub fn sniff(bytes: &[u8]) -> ContainerKind {
    if bytes.starts_with(&PNG_SIGNATURE) {
        return ContainerKind::Png;
    }
    if bytes.starts_with(&JPEG_SOI) {
        return ContainerKind::Jpeg;
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return ContainerKind::WebP;
    }
    if is_avif(bytes) {
        return ContainerKind::Avif;
    }
    if is_tensor_archive(bytes) {
        return ContainerKind::TensorArchive;
    }
    ContainerKind::Unknown
}

fn is_avif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    let has_brand = |brand: &[u8]| AVIF_BRANDS.iter().any(|b| &b[..] == brand);
    if has_brand(&bytes[8..12]) {
        return true;
    }
    // Compatible brands follow the major brand and minor version.
    let box_end = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let end = box_end.min(bytes.len());
    (16..end)
        .step_by(4)
        .filter_map(|at| bytes.get(at..at + 4))
        .any(has_brand)
}

/// 8-byte little-endian header length followed by a JSON object.
fn is_tensor_archive(bytes: &[u8]) -> bool {
    if bytes.len() < 9 {
        return false;
    }
    let header_len = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    header_len >= 2 && bytes[8] == b'{'
}
