//! Persist the registry as JSON under the XDG state dir so it survives restarts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::RangeCapabilityRegistry;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub hosts: Vec<String>,
}

impl RangeCapabilityRegistry {
    /// Default path: `~/.local/state/metasift/range_registry.json`.
    pub fn default_path() -> Result<PathBuf> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("metasift")?;
        Ok(xdg_dirs
            .get_state_home()
            .join("metasift")
            .join("range_registry.json"))
    }

    pub fn to_snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: SNAPSHOT_VERSION,
            hosts: self.hosts().map(str::to_string).collect(),
        }
    }

    /// Save to `path` (creates the parent dir if needed).
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.to_snapshot()).context("serialize range registry")?;
        std::fs::write(path, json)
            .with_context(|| format!("write range registry: {}", path.display()))?;
        Ok(())
    }

    /// Load from `path` and reconcile against `exempt_domains`.
    /// A missing file yields an empty registry.
    pub fn load_from_path(path: &Path, exempt_domains: Vec<String>) -> Result<RangeCapabilityRegistry> {
        let mut registry = RangeCapabilityRegistry::new(exempt_domains);
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
            Err(e) => {
                return Err(e).with_context(|| format!("read range registry: {}", path.display()))
            }
        };
        let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse range registry: {}", path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                "unknown range registry version, starting empty"
            );
            return Ok(registry);
        }
        registry.hosts.extend(snapshot.hosts);
        let dropped = registry.reconcile();
        if dropped > 0 {
            tracing::info!(dropped, "removed exempt hosts from range registry");
        }
        Ok(registry)
    }
}
