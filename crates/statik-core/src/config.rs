use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheSettings;
use crate::content::{Encoding, MimeTable};

/// Cache sizing (`[cache]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total byte budget for cached descriptors and buffered bytes.
    pub max_bytes: usize,
    /// Maximum number of cached paths, misses included.
    pub max_entries: usize,
    /// Filesystem files up to this size are held in memory.
    pub max_buffered_file_bytes: u64,
    /// Background sweep period in milliseconds; 0 disables the sweeper.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024,
            max_entries: 2048,
            max_buffered_file_bytes: 128 * 1024,
            sweep_interval_ms: 30_000,
        }
    }
}

/// Directory handling (`[listing]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Render a listing for directories without a welcome file.
    pub dir_allowed: bool,
    /// Names tried, in order, when a directory is requested.
    pub welcome_files: Vec<String>,
    /// Include a parent-directory row below the root.
    pub show_parent: bool,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            dir_allowed: true,
            welcome_files: vec!["index.html".to_string()],
            show_parent: true,
        }
    }
}

/// Global configuration loaded from `~/.config/statik/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatikConfig {
    /// Storage roots, searched in order. More than one forms an overlay.
    pub roots: Vec<PathBuf>,
    /// Age in milliseconds after which a cached result is re-checked.
    pub stale_window_ms: u64,
    /// Files strictly larger than this are flagged for memory mapping.
    pub mapped_min_bytes: u64,
    /// Serve symlinks whose target lies outside their root.
    pub follow_symlinks_outside_root: bool,
    /// Extra suffix to MIME type mappings, consulted before the built-in table.
    pub mime_overrides: BTreeMap<String, String>,
    pub cache: CacheConfig,
    pub listing: ListingConfig,
    /// Pre-encoded sibling formats, most preferred first.
    pub precompressed: Vec<Encoding>,
}

impl Default for StatikConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            stale_window_ms: 1000,
            mapped_min_bytes: 1024 * 1024,
            follow_symlinks_outside_root: false,
            mime_overrides: BTreeMap::new(),
            cache: CacheConfig::default(),
            listing: ListingConfig::default(),
            precompressed: vec![Encoding::new("br", ".br"), Encoding::new("gzip", ".gz")],
        }
    }
}

impl StatikConfig {
    /// Reject unusable settings and drop repeated roots (first one kept).
    pub fn validated(mut self) -> Result<Self> {
        if self.roots.is_empty() {
            bail!("config: at least one root is required");
        }
        let mut seen: Vec<PathBuf> = Vec::with_capacity(self.roots.len());
        for root in self.roots.drain(..) {
            if seen.contains(&root) {
                tracing::info!("dropping duplicate root {}", root.display());
                continue;
            }
            seen.push(root);
        }
        self.roots = seen;
        if self.cache.max_entries == 0 {
            bail!("config: cache.max_entries must be at least 1");
        }
        for enc in &self.precompressed {
            if enc.encoding.is_empty() || enc.suffix.is_empty() {
                bail!("config: precompressed entries need an encoding and a suffix");
            }
        }
        Ok(self)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.cache.sweep_interval_ms > 0).then(|| Duration::from_millis(self.cache.sweep_interval_ms))
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            stale_window: self.stale_window(),
            max_bytes: self.cache.max_bytes,
            max_entries: self.cache.max_entries,
            max_buffered_file_bytes: self.cache.max_buffered_file_bytes,
        }
    }

    pub fn mime_table(&self) -> MimeTable {
        MimeTable::with_overrides(
            self.mime_overrides
                .iter()
                .map(|(suffix, mime)| (suffix.as_str(), mime.as_str())),
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("statik")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<StatikConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = StatikConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load and validate an explicit config file.
pub fn load_from_path(path: &Path) -> Result<StatikConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: StatikConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validated()
}
