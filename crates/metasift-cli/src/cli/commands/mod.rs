//! CLI command handlers.

mod cache;
mod file;
mod get;
mod hosts;

pub use cache::{run_cache_clear, run_cache_stats};
pub use file::run_file;
pub use get::run_get;
pub use hosts::{run_hosts_clear, run_hosts_list};

use anyhow::{Context, Result};
use metasift_core::cache::MetadataCache;
use metasift_core::config::MetasiftConfig;
use metasift_core::fetch::CurlTransport;
use metasift_core::{MetadataMap, MetadataResolver};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::load_registry;

/// Resolver wired to the persisted registry. A registry that cannot be read
/// is replaced by an empty one.
fn build_resolver(
    cfg: &MetasiftConfig,
    registry_path: &Path,
    cache: Option<MetadataCache>,
) -> MetadataResolver<CurlTransport> {
    let registry = load_registry(cfg, registry_path).unwrap_or_else(|e| {
        tracing::warn!("{:#}; starting with an empty range registry", e);
        metasift_core::range_registry::RangeCapabilityRegistry::new(cfg.range_exempt_domains.clone())
    });
    MetadataResolver::from_config(cfg, Arc::new(Mutex::new(registry)), cache)
}

/// Persist registry changes made during a resolve.
async fn save_registry(resolver: &MetadataResolver<CurlTransport>, registry_path: &Path) {
    let registry = resolver.orchestrator().registry().lock().await;
    if let Err(e) = registry.save_to_path(registry_path) {
        tracing::warn!("could not save range registry: {:#}", e);
    }
}

fn print_metadata(map: &MetadataMap) -> Result<()> {
    let json = serde_json::to_string_pretty(&map.to_json()).context("serialize metadata")?;
    println!("{json}");
    Ok(())
}
