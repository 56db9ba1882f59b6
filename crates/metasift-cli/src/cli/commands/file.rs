//! `metasift file <path> [--url <key>]` – resolve local bytes.

use anyhow::{Context, Result};
use metasift_core::cache::MetadataCache;
use metasift_core::config::MetasiftConfig;
use std::path::Path;

use super::{build_resolver, print_metadata};

/// Default cache key for a local file: `file://` plus the absolute path.
pub fn file_key(path: &Path) -> String {
    let abs = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", abs.display())
}

pub async fn run_file(
    cfg: &MetasiftConfig,
    registry_path: &Path,
    cache: Option<MetadataCache>,
    path: &Path,
    url: Option<String>,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    let key = url.unwrap_or_else(|| file_key(path));
    tracing::debug!(path = %path.display(), %key, len = bytes.len(), "resolving local file");

    let resolver = build_resolver(cfg, registry_path, cache);
    let map = resolver.resolve_metadata(&key, Some(bytes)).await?;
    print_metadata(&map)
}
