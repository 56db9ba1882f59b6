use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/metasift/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetasiftConfig {
    /// Size of the first ranged request, in bytes (`bytes=0-(probe_bytes-1)`).
    pub probe_bytes: u64,
    /// Escalated range size used when the parser cannot suggest one.
    pub escalation_bytes: u64,
    /// Upper bound for every HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum number of URLs kept in the metadata cache.
    pub cache_max_items: usize,
    /// Hosts that are never recorded as range-incapable (suffix match).
    #[serde(default)]
    pub range_exempt_domains: Vec<String>,
    /// Minimum pixel count before the alpha-channel reader runs.
    pub stealth_min_pixels: u64,
    /// Images claiming more pixels than this are never decoded.
    #[serde(default = "default_stealth_max_pixels")]
    pub stealth_max_pixels: u64,
    /// Largest response body accepted from a full fetch.
    #[serde(default)]
    pub max_body_bytes: Option<u64>,
    /// Optional User-Agent header for all requests.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for MetasiftConfig {
    fn default() -> Self {
        Self {
            probe_bytes: 64 * 1024,
            escalation_bytes: 128 * 1024,
            request_timeout_secs: 10,
            cache_max_items: 5_000,
            range_exempt_domains: vec!["civitai.com".to_string()],
            stealth_min_pixels: 250_000,
            stealth_max_pixels: default_stealth_max_pixels(),
            max_body_bytes: None,
            user_agent: None,
        }
    }
}

fn default_stealth_max_pixels() -> u64 {
    crate::stealth::DEFAULT_MAX_PIXELS
}

impl MetasiftConfig {
    /// Body cap for full fetches (default 256 MiB).
    pub fn effective_max_body_bytes(&self) -> u64 {
        self.max_body_bytes.unwrap_or(256 * 1024 * 1024)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("metasift")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MetasiftConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MetasiftConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: MetasiftConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
