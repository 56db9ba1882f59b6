//! Classify transport failures for logs and host bookkeeping.

use super::TransportError;

/// Coarse kind of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request or connect timed out.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// Any other HTTP status.
    Http(u16),
    Other,
}

pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        _ => ErrorKind::Http(code as u16),
    }
}

pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

pub fn classify(e: &TransportError) -> ErrorKind {
    match e {
        TransportError::Curl(ce) => classify_curl_error(ce),
        TransportError::Http(code) => classify_http_status(*code),
        TransportError::Timeout(_) => ErrorKind::Timeout,
        TransportError::BodyTooLarge { .. } | TransportError::Join(_) => ErrorKind::Other,
    }
}
