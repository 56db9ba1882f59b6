//! `metasift hosts list|clear` – hosts fetched without range requests.

use anyhow::Result;
use metasift_core::config::MetasiftConfig;
use std::path::Path;

use crate::cli::load_registry;

pub fn run_hosts_list(cfg: &MetasiftConfig, registry_path: &Path) -> Result<()> {
    let registry = load_registry(cfg, registry_path)?;
    if registry.is_empty() {
        println!("No range-incapable hosts recorded.");
    } else {
        for host in registry.hosts() {
            println!("{host}");
        }
    }
    Ok(())
}

pub fn run_hosts_clear(cfg: &MetasiftConfig, registry_path: &Path) -> Result<()> {
    let mut registry = load_registry(cfg, registry_path)?;
    let n = registry.len();
    registry.clear();
    registry.save_to_path(registry_path)?;
    println!("Forgot {n} hosts");
    Ok(())
}
