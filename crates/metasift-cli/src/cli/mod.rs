//! CLI for metasift.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metasift_core::cache::MetadataCache;
use metasift_core::config::{self, MetasiftConfig};
use metasift_core::range_registry::RangeCapabilityRegistry;
use std::path::{Path, PathBuf};

use commands::{
    run_cache_clear, run_cache_stats, run_file, run_get, run_hosts_clear, run_hosts_list,
};

/// Top-level CLI for metasift.
#[derive(Debug, Parser)]
#[command(name = "metasift")]
#[command(about = "metasift: read generation metadata from remote images and model files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Resolve metadata for a URL and print it as JSON.
    Get {
        /// Direct HTTP/HTTPS URL of the image or model file.
        url: String,
    },

    /// Resolve metadata from a local file (no network).
    File {
        /// Path to the file.
        path: PathBuf,
        /// Cache key to store the result under (default: file:// URL of the path).
        #[arg(long)]
        url: Option<String>,
    },

    /// Inspect or clear the metadata cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect or clear the list of hosts that reject range requests.
    Hosts {
        #[command(subcommand)]
        action: HostsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Entry count, capacity and access range.
    Stats,
    /// Remove every cached entry.
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum HostsAction {
    /// Print every host fetched without range requests.
    List,
    /// Forget every recorded host.
    Clear,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let registry_path = RangeCapabilityRegistry::default_path()?;

        match cli.command {
            CliCommand::Get { url } => {
                let cache = open_cache(&cfg).await;
                run_get(&cfg, &registry_path, cache, &url).await?;
            }
            CliCommand::File { path, url } => {
                let cache = open_cache(&cfg).await;
                run_file(&cfg, &registry_path, cache, &path, url).await?;
            }
            CliCommand::Cache { action } => {
                let cache = MetadataCache::open_default(cfg.cache_max_items).await?;
                match action {
                    CacheAction::Stats => run_cache_stats(&cache).await?,
                    CacheAction::Clear => run_cache_clear(&cache).await?,
                }
            }
            CliCommand::Hosts { action } => match action {
                HostsAction::List => run_hosts_list(&cfg, &registry_path)?,
                HostsAction::Clear => run_hosts_clear(&cfg, &registry_path)?,
            },
        }

        Ok(())
    }
}

/// The cache is optional for resolves: if it cannot be opened, resolve uncached.
async fn open_cache(cfg: &MetasiftConfig) -> Option<MetadataCache> {
    match MetadataCache::open_default(cfg.cache_max_items).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("metadata cache unavailable, continuing without it: {:#}", e);
            None
        }
    }
}

pub(crate) fn load_registry(cfg: &MetasiftConfig, path: &Path) -> Result<RangeCapabilityRegistry> {
    RangeCapabilityRegistry::load_from_path(path, cfg.range_exempt_domains.clone())
        .with_context(|| format!("load range registry: {}", path.display()))
}

#[cfg(test)]
mod tests;
