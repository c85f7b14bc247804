use std::sync::Arc;

use crate::error::ResolveError;

use super::{ContentResolver, Descriptor};

/// Flags large filesystem files as eligible for memory-mapped reads.
#[derive(Debug, Clone)]
pub struct MappedResolver {
    inner: Arc<dyn ContentResolver>,
    min_bytes: u64,
}

impl MappedResolver {
    /// Files strictly larger than `min_bytes` qualify.
    pub fn new(inner: Arc<dyn ContentResolver>, min_bytes: u64) -> Self {
        Self { inner, min_bytes }
    }
}

impl ContentResolver for MappedResolver {
    fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        let found = self.inner.resolve(path_in_context)?;
        Ok(found.map(|d| {
            if d.is_fs_file() && d.len() > self.min_bytes && !d.is_mapped() {
                Arc::new(Arc::unwrap_or_clone(d).with_mapped(true))
            } else {
                d
            }
        }))
    }
}
