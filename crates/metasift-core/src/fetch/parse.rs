//! Parse HTTP response header lines.

/// Headers that matter for a (possibly ranged) GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseHeaders {
    pub content_length: Option<u64>,
    /// Full resource length from `Content-Range: bytes a-b/total`.
    pub content_range_total: Option<u64>,
}

/// Parse collected header lines. A new status line (after a redirect)
/// discards whatever was collected before it.
pub(crate) fn parse_headers(lines: &[String]) -> ResponseHeaders {
    let mut out = ResponseHeaders::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            out = ResponseHeaders::default();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    out.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("content-range") {
                out.content_range_total = parse_content_range_total(value);
            }
        }
    }
    out
}

/// `bytes 0-99/1234` → 1234; `bytes 0-99/*` → None.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}
