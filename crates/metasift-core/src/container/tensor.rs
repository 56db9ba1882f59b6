//! Tensor archive (safetensors layout): u64 LE header length, JSON header.
//!
//! The header maps tensor names to dtype/shape/offsets; the reserved
//! `__metadata__` key holds a flat string map written by training tools.

use serde_json::Value;

use crate::metadata::{MetadataMap, MetadataValue};

use super::bytes::le_u64;
use super::{malformed, ParseOutcome};

const METADATA_KEY: &str = "__metadata__";
const HEADER_PREFIX_LEN: u64 = 8;

/// Headers above this are treated as corrupt rather than fetched.
const MAX_HEADER_LEN: u64 = 100 * 1024 * 1024;

pub(crate) fn parse(bytes: &[u8]) -> ParseOutcome {
    let Some(header_len) = le_u64(bytes, 0) else {
        return ParseOutcome::Incomplete {
            suggested_min_bytes: HEADER_PREFIX_LEN,
        };
    };
    if header_len > MAX_HEADER_LEN {
        return ParseOutcome::Failed(malformed(
            "tensor_archive",
            format!("header length {header_len} exceeds {MAX_HEADER_LEN}"),
        ));
    }
    let needed = HEADER_PREFIX_LEN + header_len;
    if (bytes.len() as u64) < needed {
        return ParseOutcome::Incomplete {
            suggested_min_bytes: needed,
        };
    }

    let header = &bytes[HEADER_PREFIX_LEN as usize..needed as usize];
    let header: serde_json::Map<String, Value> = match serde_json::from_slice(header) {
        Ok(map) => map,
        Err(e) => return ParseOutcome::Failed(malformed("tensor_archive", e.to_string())),
    };

    let mut map = MetadataMap::new();
    match header.get(METADATA_KEY) {
        None => {}
        Some(Value::Object(entries)) => {
            for (key, value) in entries {
                let value = match value {
                    Value::String(s) => MetadataValue::from_text(s.clone()),
                    other => MetadataValue::Structured(other.clone()),
                };
                map.insert(key.clone(), value);
            }
        }
        Some(other) => {
            return ParseOutcome::Failed(malformed(
                "tensor_archive",
                format!("{METADATA_KEY} is not an object: {other}"),
            ));
        }
    }
    ParseOutcome::Complete(map)
}
