//! HTTP retrieval: full and `bytes=0-N` GETs.
//!
//! [`Transport`] is the seam the orchestrator drives; [`CurlTransport`] is the
//! production implementation. Tests substitute scripted transports.

mod classify;
mod curl_transport;
mod error;
mod parse;

use std::future::Future;
use std::time::Duration;

pub use classify::{classify, classify_curl_error, classify_http_status, ErrorKind};
pub use curl_transport::CurlTransport;
pub use error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Inclusive last byte for a ranged request; `None` fetches the whole body.
    pub range_end: Option<u64>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn full(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            range_end: None,
            timeout,
        }
    }

    /// Request the first `len` bytes (`bytes=0-(len-1)`).
    pub fn prefix(url: impl Into<String>, len: u64, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            range_end: Some(len.saturating_sub(1)),
            timeout,
        }
    }

    pub fn is_ranged(&self) -> bool {
        self.range_end.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// A 2xx status; anything else surfaces as [`TransportError::Http`].
    pub status: u32,
    pub body: Vec<u8>,
    /// Full resource length when the server reported it.
    pub total_len: Option<u64>,
}

impl FetchResponse {
    pub fn is_partial_content(&self) -> bool {
        self.status == 206
    }
}

/// One HTTP GET.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, TransportError>> + Send;
}
