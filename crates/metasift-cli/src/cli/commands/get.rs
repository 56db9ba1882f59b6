//! `metasift get <url>` – resolve a URL and print its metadata.

use anyhow::Result;
use metasift_core::cache::MetadataCache;
use metasift_core::config::MetasiftConfig;
use std::path::Path;

use super::{build_resolver, print_metadata, save_registry};

pub async fn run_get(
    cfg: &MetasiftConfig,
    registry_path: &Path,
    cache: Option<MetadataCache>,
    url: &str,
) -> Result<()> {
    let resolver = build_resolver(cfg, registry_path, cache);
    let result = resolver.resolve_metadata(url, None).await;
    save_registry(&resolver, registry_path).await;
    print_metadata(&result?)
}
