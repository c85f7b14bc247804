//! Request-facing facade: the assembled resolver chain plus directory
//! handling (welcome files, listings).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::cache::{self, ValidatingCache};
use crate::config::{ListingConfig, StatikConfig};
use crate::content::{BaseResolver, ContentResolver, Descriptor, MappedResolver, VariantResolver};
use crate::error::{guard, ResolveError};
use crate::listing::{self, ListingOptions, SortSpec};
use crate::location::{encode_key, FsRoot, Overlay, Storage};

/// Staleness windows an entry may sit unvalidated before the sweeper drops it.
const SWEEP_IDLE_WINDOWS: u32 = 4;

/// Outcome of [`StaticFiles::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A file, or a directory's welcome file.
    Content(Arc<Descriptor>),
    /// Rendered directory listing.
    Listing(String),
    /// A directory with no welcome file while listings are disabled.
    Forbidden,
    NotFound,
}

/// Storage, resolver chain and directory policy for one site.
#[derive(Debug)]
pub struct StaticFiles {
    storage: Arc<dyn Storage>,
    cache: Arc<ValidatingCache>,
    listing: ListingConfig,
    sweep_interval: Option<Duration>,
}

impl StaticFiles {
    /// Open the configured roots and assemble the chain.
    pub fn from_config(cfg: &StatikConfig) -> Result<Self> {
        let storage = open_roots(&cfg.roots, cfg.follow_symlinks_outside_root)?;
        Ok(Self::new(storage, cfg))
    }

    /// Assemble cache, variant, mapped and base resolvers over `storage`.
    pub fn new(storage: Arc<dyn Storage>, cfg: &StatikConfig) -> Self {
        let base: Arc<dyn ContentResolver> =
            Arc::new(BaseResolver::new(Arc::clone(&storage), cfg.mime_table()));
        let mapped: Arc<dyn ContentResolver> = Arc::new(MappedResolver::new(base, cfg.mapped_min_bytes));
        let variants: Arc<dyn ContentResolver> =
            Arc::new(VariantResolver::new(mapped, cfg.precompressed.clone()));
        let cache = Arc::new(ValidatingCache::new(
            variants,
            Arc::clone(&storage),
            cfg.cache_settings(),
        ));
        tracing::info!(
            stale_window_ms = cfg.stale_window_ms,
            max_bytes = cfg.cache.max_bytes,
            encodings = cfg.precompressed.len(),
            "static content pipeline ready"
        );
        Self {
            storage,
            cache,
            listing: cfg.listing.clone(),
            sweep_interval: cfg.sweep_interval(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Outermost resolver; what collaborators call `resolve` on.
    pub fn cache(&self) -> &Arc<ValidatingCache> {
        &self.cache
    }

    pub fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        self.cache.resolve(path_in_context)
    }

    /// Start the background sweep if one is configured. Requires a tokio
    /// runtime.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let period = self.sweep_interval?;
        Some(cache::spawn_sweeper(Arc::clone(&self.cache), period, SWEEP_IDLE_WINDOWS))
    }

    /// Resolve a request, falling back to welcome files and listings for
    /// directories. `context_path` is the encoded URL the directory is served
    /// under; listing hrefs are built from it.
    pub fn lookup(&self, path_in_context: &str, context_path: &str) -> Result<Lookup, ResolveError> {
        self.lookup_sorted(path_in_context, context_path, SortSpec::default())
    }

    pub fn lookup_sorted(
        &self,
        path_in_context: &str,
        context_path: &str,
        sort: SortSpec,
    ) -> Result<Lookup, ResolveError> {
        let Some(found) = self.cache.resolve(path_in_context)? else {
            return Ok(Lookup::NotFound);
        };
        if !found.is_dir() {
            return Ok(Lookup::Content(found));
        }

        if let Some(welcome) = self.welcome(&found) {
            return Ok(Lookup::Content(welcome));
        }
        if !self.listing.dir_allowed {
            return Ok(Lookup::Forbidden);
        }
        let options = ListingOptions {
            show_parent: self.listing.show_parent,
            sort,
        };
        let page = guard(path_in_context, || {
            listing::generate(found.location(), context_path, &options)
        })?;
        Ok(Lookup::Listing(page))
    }

    fn welcome(&self, dir: &Descriptor) -> Option<Arc<Descriptor>> {
        for name in &self.listing.welcome_files {
            let key = if dir.path() == "/" {
                format!("/{name}")
            } else {
                format!("{}/{name}", dir.path())
            };
            match self.cache.resolve(&encode_key(&key)) {
                Ok(Some(d)) if !d.is_dir() => return Some(d),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(dir = %dir.path(), welcome = %name, error = %err, "welcome file lookup failed");
                }
            }
        }
        None
    }
}

/// One filesystem root, or an overlay of several in the given order.
pub fn open_roots(roots: &[PathBuf], follow_outside: bool) -> Result<Arc<dyn Storage>> {
    let mut opened: Vec<Arc<dyn Storage>> = Vec::with_capacity(roots.len());
    for root in roots {
        let fs_root = FsRoot::open_with(root, follow_outside)
            .with_context(|| format!("open root {}", root.display()))?;
        opened.push(Arc::new(fs_root));
    }
    if opened.len() == 1 {
        if let Some(only) = opened.pop() {
            return Ok(only);
        }
    }
    Ok(Arc::new(Overlay::new(opened)?))
}
