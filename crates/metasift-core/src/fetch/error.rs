//! Transport failure type.

use std::time::Duration;

use thiserror::Error;

/// A request that produced no usable body.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Curl reported an error (DNS, connect, TLS, aborted transfer).
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),

    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    /// The blocking transfer task panicked or was cancelled.
    #[error("transfer task: {0}")]
    Join(String),
}
