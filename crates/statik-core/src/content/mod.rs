//! Content descriptors and the resolver chain.
//!
//! A [`ContentResolver`] turns a request path into a [`Descriptor`] or
//! `None`. [`BaseResolver`] reads from storage; [`VariantResolver`] and
//! [`MappedResolver`] wrap another resolver and enrich its result. The
//! validating cache in [`crate::cache`] is the outermost layer.

mod base;
pub mod etag;
mod mapped;
mod mime;
mod variant;

use std::fmt;
use std::fs::File;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use memmap2::Mmap;

use crate::error::ResolveError;
use crate::location::{Location, Origin};

pub use base::BaseResolver;
pub use mapped::MappedResolver;
pub use mime::MimeTable;
pub use variant::{Encoding, VariantResolver};

/// Maps a request path to servable content.
pub trait ContentResolver: Send + Sync + fmt::Debug {
    /// `Ok(None)` when nothing exists at the path. Faults come back as
    /// [`ResolveError::InvalidRequestPath`] carrying only `path_in_context`.
    fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError>;
}

/// One servable artifact: file or directory.
///
/// Built by [`BaseResolver`]; decorators produce modified copies rather than
/// editing a shared instance.
#[derive(Debug, Clone)]
pub struct Descriptor {
    location: Location,
    content_type: Option<String>,
    len: u64,
    modified: SystemTime,
    etag: String,
    content_encoding: Option<String>,
    variants: Vec<(String, Arc<Descriptor>)>,
    mapped: bool,
    buffer: Option<Arc<[u8]>>,
}

impl Descriptor {
    /// Describe an existing location.
    pub fn new(location: Location, content_type: Option<String>) -> Result<Self> {
        let Some(meta) = location.meta() else {
            bail!("cannot describe a missing location: {}", location.path());
        };
        Ok(Self {
            etag: etag::weak_tag(meta.len, meta.modified),
            len: meta.len,
            modified: meta.modified,
            content_type,
            content_encoding: None,
            variants: Vec::new(),
            mapped: false,
            buffer: None,
            location,
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Logical path of the backing location.
    pub fn path(&self) -> &str {
        self.location.path()
    }

    pub fn is_dir(&self) -> bool {
        self.location.is_dir()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Weak validation tag.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// Encoding of this representation; `None` for the identity form.
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// Pre-encoded alternatives, in configured preference order.
    pub fn variants(&self) -> &[(String, Arc<Descriptor>)] {
        &self.variants
    }

    pub fn variant(&self, encoding: &str) -> Option<&Arc<Descriptor>> {
        self.variants
            .iter()
            .find(|(name, _)| name == encoding)
            .map(|(_, d)| d)
    }

    /// First variant, in preference order, whose encoding the caller accepts.
    pub fn preferred_variant(&self, accepted: &[&str]) -> Option<&Arc<Descriptor>> {
        self.variants
            .iter()
            .find(|(name, _)| accepted.iter().any(|a| a.eq_ignore_ascii_case(name)))
            .map(|(_, d)| d)
    }

    /// Eligible for memory-mapped delivery.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Bytes held in memory by the cache, if any.
    pub fn buffer(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Full contents, from the buffer when present.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        match &self.buffer {
            Some(buf) => Ok(buf.to_vec()),
            None => self.location.read_all(),
        }
    }

    /// Read-only mapping of the backing file. Only valid for mapped
    /// descriptors.
    pub fn map(&self) -> Result<Mmap> {
        if !self.mapped {
            bail!("content is not eligible for mapping: {}", self.path());
        }
        let path = self
            .location
            .file_path()
            .with_context(|| format!("no backing file for {}", self.path()))?;
        let file = File::open(path).with_context(|| format!("open {}", self.path()))?;
        // SAFETY: read-only map of a regular file; concurrent truncation by
        // another process is the usual mmap caveat and is caught by revalidation.
        let map = unsafe { Mmap::map(&file) }.with_context(|| format!("mmap {}", self.path()))?;
        Ok(map)
    }

    pub(crate) fn with_variants(mut self, variants: Vec<(String, Arc<Descriptor>)>) -> Self {
        self.variants = variants;
        self
    }

    pub(crate) fn with_mapped(mut self, mapped: bool) -> Self {
        self.mapped = mapped;
        self
    }

    pub(crate) fn with_buffer(mut self, buffer: Arc<[u8]>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// This descriptor presented as the `encoding` form of `primary`.
    pub(crate) fn into_variant_of(mut self, primary: &Descriptor, encoding: &str) -> Self {
        self.content_type = primary.content_type.clone();
        self.content_encoding = Some(encoding.to_string());
        self.etag = etag::with_encoding(&primary.etag, encoding);
        self.variants.clear();
        self
    }

    /// Filesystem file, as opposed to an in-memory blob or a directory.
    pub(crate) fn is_fs_file(&self) -> bool {
        self.location.origin() == Origin::Filesystem && self.location.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{FsRoot, MemoryStore, Storage};
    use std::time::Duration;

    #[test]
    fn missing_location_cannot_be_described() {
        assert!(Descriptor::new(Location::missing("/x"), None).is_err());
    }

    #[test]
    fn preferred_variant_follows_configured_order() {
        let store = MemoryStore::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        store.insert("/a.txt", b"plain".to_vec(), t).unwrap();
        store.insert("/a.txt.br", b"b".to_vec(), t).unwrap();
        store.insert("/a.txt.gz", b"g".to_vec(), t).unwrap();
        let primary = Descriptor::new(store.resolve("/a.txt").unwrap(), Some("text/plain".into())).unwrap();
        let br = Descriptor::new(store.resolve("/a.txt.br").unwrap(), None)
            .unwrap()
            .into_variant_of(&primary, "br");
        let gz = Descriptor::new(store.resolve("/a.txt.gz").unwrap(), None)
            .unwrap()
            .into_variant_of(&primary, "gzip");
        let d = primary.clone().with_variants(vec![
            ("br".into(), Arc::new(br)),
            ("gzip".into(), Arc::new(gz)),
        ]);

        assert_eq!(d.preferred_variant(&["gzip", "br"]).unwrap().content_encoding(), Some("br"));
        assert_eq!(d.preferred_variant(&["GZIP"]).unwrap().content_encoding(), Some("gzip"));
        assert!(d.preferred_variant(&["zstd"]).is_none());
        let gz = d.variant("gzip").unwrap();
        assert_eq!(gz.content_type(), Some("text/plain"));
        assert_eq!(gz.etag(), etag::with_encoding(primary.etag(), "gzip"));
    }

    #[test]
    fn buffer_is_preferred_for_reads() {
        let store = MemoryStore::new();
        store.insert("/f", b"on-store".to_vec(), SystemTime::UNIX_EPOCH).unwrap();
        let d = Descriptor::new(store.resolve("/f").unwrap(), None).unwrap();
        assert_eq!(d.read_all().unwrap(), b"on-store");
        let d = d.with_buffer(Arc::from(&b"buffered"[..]));
        assert_eq!(d.buffer(), Some(&b"buffered"[..]));
        assert_eq!(d.read_all().unwrap(), b"buffered");
    }

    #[test]
    fn map_requires_eligibility() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.bin"), vec![7u8; 4096]).unwrap();
        let root = FsRoot::open(dir.path()).unwrap();
        let d = Descriptor::new(root.resolve("/big.bin").unwrap(), None).unwrap();
        assert!(d.is_fs_file());
        assert!(d.map().is_err());
        let map = d.with_mapped(true).map().unwrap();
        assert_eq!(map.len(), 4096);
        assert!(map.iter().all(|b| *b == 7));
    }
}
