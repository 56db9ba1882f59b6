//! Container parsers: one handler per [`ContainerKind`], shared outcome type.
//!
//! Every handler takes a possibly truncated prefix of the resource and either
//! produces the metadata, asks for a longer prefix, or gives up. Dispatch goes
//! through [`parse`], which also enforces the rules that hold for all formats:
//! a complete buffer never yields `Incomplete`, and a suggestion always asks
//! for more than the bytes already held.

mod avif;
mod bytes;
mod exif;
mod jpeg;
mod png;
mod tensor;
mod text;
mod webp;

use thiserror::Error;

use crate::metadata::MetadataMap;
use crate::sniff::{sniff, ContainerKind, SNIFF_LEN};

/// Bumped whenever a parser change can turn a former empty result into a
/// non-empty one. Stored next to every cache entry.
pub const PARSER_REVISION: u32 = 2;

/// Revision at which tensor-archive headers started being parsed. Cached empty
/// results for `.safetensors` URLs written below it are retried once.
pub const TENSOR_ARCHIVE_REVISION: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Complete(MetadataMap),
    Incomplete { suggested_min_bytes: u64 },
    Failed(ParseError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The whole resource is in hand and still ends early.
    #[error("input truncated: at least {needed} bytes required")]
    Truncated { needed: u64 },

    #[error("malformed {kind} container: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("unsupported container")]
    Unsupported,
}

pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        kind,
        reason: reason.into(),
    }
}

/// Sniff `bytes` and parse with the matching handler.
///
/// `total_len` is the full resource length when known; `bytes` is complete when
/// its length reaches it.
pub fn parse(bytes: &[u8], total_len: Option<u64>) -> (ContainerKind, ParseOutcome) {
    let complete = is_complete(bytes, total_len);
    if bytes.len() < SNIFF_LEN && !complete {
        let outcome = finalize(
            ParseOutcome::Incomplete {
                suggested_min_bytes: SNIFF_LEN as u64,
            },
            bytes.len() as u64,
            total_len,
            complete,
        );
        return (ContainerKind::Unknown, outcome);
    }
    let kind = sniff(bytes);
    (kind, parse_as(kind, bytes, total_len))
}

/// Parse with a known container kind.
pub fn parse_as(kind: ContainerKind, bytes: &[u8], total_len: Option<u64>) -> ParseOutcome {
    let outcome = match kind {
        ContainerKind::Png => png::parse(bytes),
        ContainerKind::Jpeg => jpeg::parse(bytes),
        ContainerKind::WebP => webp::parse(bytes),
        ContainerKind::Avif => avif::parse(bytes),
        ContainerKind::TensorArchive => tensor::parse(bytes),
        ContainerKind::Unknown => ParseOutcome::Complete(MetadataMap::new()),
    };
    finalize(
        outcome,
        bytes.len() as u64,
        total_len,
        is_complete(bytes, total_len),
    )
}

fn is_complete(bytes: &[u8], total_len: Option<u64>) -> bool {
    total_len.is_some_and(|total| bytes.len() as u64 >= total)
}

fn finalize(outcome: ParseOutcome, held: u64, total_len: Option<u64>, complete: bool) -> ParseOutcome {
    match outcome {
        ParseOutcome::Incomplete {
            suggested_min_bytes,
        } => {
            if complete {
                return ParseOutcome::Failed(ParseError::Truncated {
                    needed: suggested_min_bytes.max(held + 1),
                });
            }
            let mut suggested = suggested_min_bytes.max(held + 1);
            if let Some(total) = total_len {
                suggested = suggested.min(total);
            }
            ParseOutcome::Incomplete {
                suggested_min_bytes: suggested,
            }
        }
        other => other,
    }
}
