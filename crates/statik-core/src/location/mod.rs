//! Storage locations.
//!
//! A [`Location`] is an immutable snapshot of one position in a storage
//! backend: existence, kind, length and modification time, plus the handle
//! needed to read bytes or enumerate children. Backends implement
//! [`Storage`]; [`Overlay`] stacks several of them into one namespace.

mod fs;
mod memory;
mod overlay;
mod path;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{bail, Result};

pub use fs::FsRoot;
pub use memory::MemoryStore;
pub use overlay::Overlay;
pub use path::{encode_key, normalize, RelativePath};

use fs::FsJail;
use memory::Blob;

/// A backend that maps contained relative paths to locations.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Look up an already-normalized path. Absent entries yield a missing
    /// location, not an error; errors are backend faults.
    fn locate(&self, path: &RelativePath) -> Result<Location>;

    /// Look up a raw request path. Anything that would leave the root is
    /// reported as a missing location.
    fn resolve(&self, raw: &str) -> Result<Location> {
        match normalize(raw)? {
            Some(path) => self.locate(&path),
            None => {
                tracing::debug!(path = %raw, "request path escapes root");
                Ok(Location::missing(RelativePath::root().key()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Dir,
}

/// Where the bytes behind a location live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A real filesystem entry; eligible for memory mapping.
    Filesystem,
    /// Bytes held in process memory.
    Memory,
    /// Nothing backs this location.
    Missing,
}

/// Metadata captured when the location was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub kind: Kind,
    pub len: u64,
    pub modified: SystemTime,
}

#[derive(Clone)]
enum Handle {
    None,
    Fs { path: PathBuf, jail: Arc<FsJail> },
    Blob(Arc<Blob>),
    MemDir(MemoryStore),
    /// Same directory found in several overlay roots, first root first.
    Merged(Vec<Location>),
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print host paths.
        match self {
            Handle::None => f.write_str("None"),
            Handle::Fs { .. } => f.write_str("Fs"),
            Handle::Blob(b) => write!(f, "Blob({} bytes)", b.data.len()),
            Handle::MemDir(_) => f.write_str("MemDir"),
            Handle::Merged(parts) => write!(f, "Merged({})", parts.len()),
        }
    }
}

/// Snapshot of one storage position.
#[derive(Debug, Clone)]
pub struct Location {
    path: String,
    meta: Option<Meta>,
    origin: Origin,
    handle: Handle,
}

impl Location {
    /// A location that does not exist.
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            meta: None,
            origin: Origin::Missing,
            handle: Handle::None,
        }
    }

    fn fs(path: String, meta: Meta, fs_path: PathBuf, jail: Arc<FsJail>) -> Self {
        Self {
            path,
            meta: Some(meta),
            origin: Origin::Filesystem,
            handle: Handle::Fs {
                path: fs_path,
                jail,
            },
        }
    }

    fn blob(path: String, blob: Arc<Blob>) -> Self {
        Self {
            meta: Some(Meta {
                kind: Kind::File,
                len: blob.data.len() as u64,
                modified: blob.modified,
            }),
            path,
            origin: Origin::Memory,
            handle: Handle::Blob(blob),
        }
    }

    fn mem_dir(path: String, modified: SystemTime, store: MemoryStore) -> Self {
        Self {
            path,
            meta: Some(Meta {
                kind: Kind::Dir,
                len: 0,
                modified,
            }),
            origin: Origin::Memory,
            handle: Handle::MemDir(store),
        }
    }

    /// Combine two directory snapshots of the same logical path; `self`
    /// keeps precedence and supplies the metadata.
    fn merge(self, other: Location) -> Location {
        let mut parts = match self.handle {
            Handle::Merged(ref parts) => parts.clone(),
            _ => vec![self.clone()],
        };
        match other.handle {
            Handle::Merged(more) => parts.extend(more),
            _ => parts.push(other),
        }
        Location {
            path: self.path,
            meta: self.meta,
            origin: self.origin,
            handle: Handle::Merged(parts),
        }
    }

    /// Logical path inside the namespace (`/` or `/a/b`). Never a host path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn exists(&self) -> bool {
        self.meta.is_some()
    }

    pub fn meta(&self) -> Option<Meta> {
        self.meta
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.meta, Some(Meta { kind: Kind::Dir, .. }))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.meta, Some(Meta { kind: Kind::File, .. }))
    }

    /// Byte length; 0 when missing or a directory.
    pub fn len(&self) -> u64 {
        self.meta.map(|m| m.len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.meta.map(|m| m.modified)
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Host path of a regular filesystem file, for memory mapping.
    pub fn file_path(&self) -> Option<&Path> {
        match (&self.handle, self.is_file()) {
            (Handle::Fs { path, .. }, true) => Some(path),
            _ => None,
        }
    }

    /// True when `other` describes the same existence, kind, length and
    /// modification time.
    pub fn same_snapshot(&self, other: &Location) -> bool {
        self.meta == other.meta
    }

    /// Children of a directory, in backend order. Overlay directories are
    /// merged by name, first root wins; a root that cannot be enumerated is
    /// left out. Each call enumerates afresh.
    pub fn children(&self) -> Result<Vec<Location>> {
        if !self.is_dir() {
            return Ok(Vec::new());
        }
        match &self.handle {
            Handle::Fs { path, jail } => fs::list(&self.path, path, jail),
            Handle::MemDir(store) => store.list(&self.path),
            Handle::Merged(parts) => {
                let mut merged: Vec<Location> = Vec::new();
                let mut index: HashMap<String, usize> = HashMap::new();
                for part in parts {
                    let children = match part.children() {
                        Ok(children) => children,
                        Err(err) => {
                            tracing::warn!(dir = %self.path, error = %format!("{err:#}"), "skipping unreadable overlay root");
                            continue;
                        }
                    };
                    for child in children {
                        match index.get(child.name()) {
                            Some(&at) => {
                                if merged[at].is_dir() && child.is_dir() {
                                    let first = merged[at].clone();
                                    merged[at] = first.merge(child);
                                }
                            }
                            None => {
                                index.insert(child.name().to_string(), merged.len());
                                merged.push(child);
                            }
                        }
                    }
                }
                Ok(merged)
            }
            Handle::None | Handle::Blob(_) => Ok(Vec::new()),
        }
    }

    /// Read up to `len` bytes starting at `offset`. Short reads happen only at
    /// end of file.
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if !self.is_file() {
            bail!("not a readable file: {}", self.path);
        }
        match &self.handle {
            Handle::Fs { path, .. } => fs::read_range(&self.path, path, offset, len),
            Handle::Blob(blob) => {
                let data = &blob.data;
                let start = (offset.min(data.len() as u64)) as usize;
                let end = (offset.saturating_add(len).min(data.len() as u64)) as usize;
                Ok(data[start..end].to_vec())
            }
            _ => bail!("not a readable file: {}", self.path),
        }
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read_range(0, self.len())
    }
}

/// Join a logical directory path and a child name.
fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" || parent.is_empty() {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
