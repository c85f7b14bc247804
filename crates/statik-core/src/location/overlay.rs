//! Ordered union of storage roots.

use anyhow::{bail, Result};
use std::sync::Arc;

use super::{Location, RelativePath, Storage};

/// Several roots presented as one namespace. Earlier roots shadow later ones.
#[derive(Debug, Clone)]
pub struct Overlay {
    roots: Vec<Arc<dyn Storage>>,
}

impl Overlay {
    pub fn new(roots: Vec<Arc<dyn Storage>>) -> Result<Self> {
        if roots.is_empty() {
            bail!("overlay needs at least one root");
        }
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[Arc<dyn Storage>] {
        &self.roots
    }
}

impl Storage for Overlay {
    /// First root where the path exists wins. When that hit is a directory,
    /// the same directory in later roots is folded in so listings see the
    /// union. With no hit, the first root's missing location is returned.
    fn locate(&self, path: &RelativePath) -> Result<Location> {
        let mut first_missing: Option<Location> = None;
        let mut hit: Option<Location> = None;

        for root in &self.roots {
            let loc = root.locate(path)?;
            match hit.take() {
                None if loc.exists() => {
                    if !loc.is_dir() {
                        return Ok(loc);
                    }
                    hit = Some(loc);
                }
                None => {
                    if first_missing.is_none() {
                        first_missing = Some(loc);
                    }
                }
                Some(dir) => {
                    hit = Some(if loc.is_dir() { dir.merge(loc) } else { dir });
                }
            }
        }

        Ok(hit
            .or(first_missing)
            .unwrap_or_else(|| Location::missing(path.key())))
    }
}
