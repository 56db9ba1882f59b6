//! Errors surfaced to callers of the resolver.
//!
//! Only a failed full fetch (or a URL that cannot be fetched at all) is an
//! error. Truncated or malformed containers and failed alpha-channel decodes
//! degrade to an empty [`MetadataMap`](crate::MetadataMap).

use thiserror::Error;

use crate::fetch::TransportError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("fetching {url} failed")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}
