//! Entry point: cache lookup, then adaptive fetch, then write-through.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::MetadataCache;
use crate::checksum::content_key;
use crate::config::MetasiftConfig;
use crate::container::{PARSER_REVISION, TENSOR_ARCHIVE_REVISION};
use crate::error::ResolveError;
use crate::fetch::{CurlTransport, Transport};
use crate::metadata::MetadataMap;
use crate::orchestrator::{FetchOrchestrator, OrchestratorSettings};
use crate::range_registry::RangeCapabilityRegistry;
use crate::stealth::StealthDecoder;

/// Resolves URLs (or caller-supplied bytes) to metadata, through the cache.
pub struct MetadataResolver<T> {
    orchestrator: FetchOrchestrator<T>,
    cache: Option<MetadataCache>,
}

impl MetadataResolver<CurlTransport> {
    /// Production wiring from config: curl transport, shared registry and cache.
    pub fn from_config(
        cfg: &MetasiftConfig,
        registry: Arc<Mutex<RangeCapabilityRegistry>>,
        cache: Option<MetadataCache>,
    ) -> Self {
        let transport = CurlTransport::new(cfg.user_agent.clone(), cfg.effective_max_body_bytes());
        Self::new(
            FetchOrchestrator::new(
                transport,
                registry,
                OrchestratorSettings::from(cfg),
                StealthDecoder::new(cfg.stealth_min_pixels).with_max_pixels(cfg.stealth_max_pixels),
            ),
            cache,
        )
    }
}

impl<T: Transport> MetadataResolver<T> {
    pub fn new(orchestrator: FetchOrchestrator<T>, cache: Option<MetadataCache>) -> Self {
        Self {
            orchestrator,
            cache,
        }
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator<T> {
        &self.orchestrator
    }

    pub fn cache(&self) -> Option<&MetadataCache> {
        self.cache.as_ref()
    }

    /// Metadata for `url`.
    ///
    /// With `raw_bytes`, nothing is fetched: the bytes are taken as the whole
    /// resource and cached under `url`. Cache failures are logged and do not
    /// fail the request.
    pub async fn resolve_metadata(
        &self,
        url: &str,
        raw_bytes: Option<Vec<u8>>,
    ) -> Result<MetadataMap, ResolveError> {
        if let Some(hit) = self.cached(url).await {
            return Ok(hit);
        }

        let (metadata, container) = match raw_bytes {
            Some(bytes) => {
                let (kind, map) = self.orchestrator.evaluate_bytes(bytes).await;
                (map, kind)
            }
            None => {
                let outcome = self.orchestrator.fetch(url).await?;
                tracing::info!(
                    %url,
                    container = outcome.container.as_str(),
                    keys = outcome.metadata.len(),
                    bytes = outcome.state.bytes_fetched,
                    requests = outcome.state.requests,
                    "resolved"
                );
                (outcome.metadata, outcome.container)
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .set_entry(url, &metadata, container, PARSER_REVISION)
                .await
            {
                tracing::warn!(%url, error = %format!("{e:#}"), "cache write failed");
            }
        }
        Ok(metadata)
    }

    /// Metadata for local bytes, cached under their content key.
    pub async fn resolve_bytes(&self, bytes: Vec<u8>) -> Result<MetadataMap, ResolveError> {
        let key = content_key(&bytes);
        self.resolve_metadata(&key, Some(bytes)).await
    }

    async fn cached(&self, url: &str) -> Option<MetadataMap> {
        let cache = self.cache.as_ref()?;
        let entry = match cache.get_entry(url).await {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(%url, error = %format!("{e:#}"), "cache read failed");
                return None;
            }
        };
        if retry_stale_tensor_result(url, &entry.metadata, entry.parser_revision) {
            tracing::info!(%url, revision = entry.parser_revision, "re-checking stale empty tensor archive result");
            return None;
        }
        tracing::debug!(%url, "cache hit");
        Some(entry.metadata)
    }
}

/// Empty results for `.safetensors` URLs cached before tensor headers were
/// parsed are retried once; the rewrite stamps the current revision.
pub fn retry_stale_tensor_result(url: &str, metadata: &MetadataMap, revision: u32) -> bool {
    metadata.is_empty() && revision < TENSOR_ARCHIVE_REVISION && is_tensor_archive_url(url)
}

fn is_tensor_archive_url(url: &str) -> bool {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    path.to_ascii_lowercase().ends_with(".safetensors")
}
