//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body for every path. Depending on [`RangeBehaviour`] a
//! `Range: bytes=X-Y` GET is answered with 206, ignored (200 with the whole
//! body) or rejected with an error status. Every request is counted.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBehaviour {
    /// 206 Partial Content with `Content-Range`.
    Honor,
    /// 200 OK with the whole body.
    Ignore,
    /// Ranged GETs get this status; plain GETs still succeed.
    Reject(u16),
}

#[derive(Debug, Default)]
pub struct RequestCounts {
    pub total: AtomicUsize,
    pub ranged: AtomicUsize,
}

pub struct RangeServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub base: String,
    counts: Arc<RequestCounts>,
}

impl RangeServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }

    /// "127.0.0.1:<port>", as the range registry keys it.
    pub fn host(&self) -> String {
        self.base
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    pub fn requests(&self) -> usize {
        self.counts.total.load(Ordering::SeqCst)
    }

    pub fn ranged_requests(&self) -> usize {
        self.counts.ranged.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>, behaviour: RangeBehaviour) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let counts = Arc::new(RequestCounts::default());
    let server_counts = Arc::clone(&counts);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let counts = Arc::clone(&server_counts);
            thread::spawn(move || handle(stream, &body, behaviour, &counts));
        }
    });
    RangeServer {
        base: format!("http://127.0.0.1:{}/", port),
        counts,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    behaviour: RangeBehaviour,
    counts: &RequestCounts,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }
    counts.total.fetch_add(1, Ordering::SeqCst);
    if range.is_some() {
        counts.ranged.fetch_add(1, Ordering::SeqCst);
    }

    let total = body.len() as u64;
    let (status, content_range, slice) = match (behaviour, range) {
        (RangeBehaviour::Reject(code), Some(_)) => {
            let response = format!(
                "HTTP/1.1 {} Rejected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        (RangeBehaviour::Honor, Some((start, end_incl))) => {
            let start = start.min(total);
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                (
                    "416 Range Not Satisfiable".to_string(),
                    Some(format!("bytes */{}", total)),
                    &body[0..0],
                )
            } else {
                let end_excl = (end_incl + 1).min(total) as usize;
                let slice = body.get(start as usize..end_excl).unwrap_or(&body[0..0]);
                (
                    "206 Partial Content".to_string(),
                    Some(format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total)),
                    slice,
                )
            }
        }
        _ => ("200 OK".to_string(), None, body),
    };
    let content_range = content_range
        .map(|v| format!("Content-Range: {}\r\n", v))
        .unwrap_or_default();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end_incl = b.trim().parse::<u64>().unwrap_or(u64::MAX);
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
