use std::sync::Arc;

use crate::error::{guard, ResolveError};
use crate::location::Storage;

use super::{ContentResolver, Descriptor, MimeTable};

/// Resolves directly against a storage backend (a single root or an overlay).
#[derive(Debug, Clone)]
pub struct BaseResolver {
    storage: Arc<dyn Storage>,
    mime: MimeTable,
}

impl BaseResolver {
    pub fn new(storage: Arc<dyn Storage>, mime: MimeTable) -> Self {
        Self { storage, mime }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }
}

impl ContentResolver for BaseResolver {
    fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        guard(path_in_context, || {
            let location = self.storage.resolve(path_in_context)?;
            if !location.exists() {
                return Ok(None);
            }
            let content_type = if location.is_file() {
                self.mime.lookup(location.path())
            } else {
                None
            };
            Ok(Some(Arc::new(Descriptor::new(location, content_type)?)))
        })
    }
}
