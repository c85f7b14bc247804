use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::location::encode_key;

use super::{ContentResolver, Descriptor};

/// A pre-encoded companion: content encoding name and the filename suffix
/// its files carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encoding {
    pub encoding: String,
    pub suffix: String,
}

impl Encoding {
    pub fn new(encoding: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            encoding: encoding.into(),
            suffix: suffix.into(),
        }
    }
}

/// Attaches pre-encoded siblings (`foo.txt.gz` for `foo.txt`) as variants.
#[derive(Debug, Clone)]
pub struct VariantResolver {
    inner: Arc<dyn ContentResolver>,
    encodings: Vec<Encoding>,
}

impl VariantResolver {
    /// `encodings` are tried, and later offered, in the given order.
    pub fn new(inner: Arc<dyn ContentResolver>, encodings: Vec<Encoding>) -> Self {
        Self { inner, encodings }
    }
}

impl ContentResolver for VariantResolver {
    fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        let Some(primary) = self.inner.resolve(path_in_context)? else {
            return Ok(None);
        };
        if primary.is_dir() || self.encodings.is_empty() {
            return Ok(Some(primary));
        }

        let mut variants = Vec::new();
        for enc in &self.encodings {
            let sibling = encode_key(&format!("{}{}", primary.path(), enc.suffix));
            match self.inner.resolve(&sibling) {
                Ok(Some(found)) if !found.is_dir() => {
                    let variant = Arc::unwrap_or_clone(found).into_variant_of(&primary, &enc.encoding);
                    variants.push((enc.encoding.clone(), Arc::new(variant)));
                }
                Ok(_) => {}
                Err(err) => {
                    // A broken sibling must not hide the primary content.
                    tracing::debug!(path = %path_in_context, encoding = %enc.encoding, error = %err, "variant lookup failed");
                }
            }
        }

        if variants.is_empty() {
            return Ok(Some(primary));
        }
        Ok(Some(Arc::new(Arc::unwrap_or_clone(primary).with_variants(variants))))
    }
}
