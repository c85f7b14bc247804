//! Filesystem-backed storage root.
//!
//! The root is canonicalized once at construction. Every lookup joins plain
//! segments onto it and, unless configured otherwise, re-checks that the
//! canonical result still lies under the root so symlinks cannot lead out.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::{child_path, Kind, Location, Meta, RelativePath, Storage};

/// Containment settings shared by a root and every location it hands out.
#[derive(Debug)]
pub(super) struct FsJail {
    root: PathBuf,
    follow_outside: bool,
}

impl FsJail {
    /// Stat `fs_path`; `Ok(None)` when absent, outside the root, or neither a
    /// regular file nor a directory. Errors name only `logical`.
    fn stat(&self, logical: &str, fs_path: &Path) -> Result<Option<Meta>> {
        let md = match fs::metadata(fs_path) {
            Ok(md) => md,
            Err(e) if is_absent(&e) => return Ok(None),
            Err(e) => return Err(host_fault(e, "stat", logical, fs_path)),
        };
        if !self.follow_outside {
            let real = fs::canonicalize(fs_path)
                .map_err(|e| host_fault(e, "canonicalize", logical, fs_path))?;
            if !real.starts_with(&self.root) {
                tracing::debug!(target = %real.display(), "alias leaves root, treating as missing");
                return Ok(None);
            }
        }
        let kind = if md.is_dir() {
            Kind::Dir
        } else if md.is_file() {
            Kind::File
        } else {
            // FIFOs, sockets and devices can block or never end on read.
            tracing::debug!(path = %logical, "not a regular file, treating as missing");
            return Ok(None);
        };
        let modified = md
            .modified()
            .map_err(|e| host_fault(e, "mtime", logical, fs_path))?;
        Ok(Some(Meta {
            kind,
            len: if kind == Kind::Dir { 0 } else { md.len() },
            modified,
        }))
    }
}

/// NotFound, or a path component that is a file.
fn is_absent(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

/// I/O failure described by logical path; the host path goes to the debug log
/// only.
fn host_fault(err: io::Error, op: &str, logical: &str, fs_path: &Path) -> anyhow::Error {
    tracing::debug!(path = %logical, host = %fs_path.display(), error = %err, "{op} failed");
    anyhow::Error::new(err).context(format!("{op} {logical}"))
}

/// A directory on the local filesystem serving as a storage root.
#[derive(Debug, Clone)]
pub struct FsRoot {
    jail: Arc<FsJail>,
}

impl FsRoot {
    /// Open `root`, which must be an existing directory.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with(root, false)
    }

    /// Open `root`; when `follow_outside` is set, symlinks may point anywhere.
    pub fn open_with(root: &Path, follow_outside: bool) -> Result<Self> {
        let canonical = fs::canonicalize(root)
            .with_context(|| format!("failed to open storage root: {}", root.display()))?;
        if !canonical.is_dir() {
            anyhow::bail!("storage root is not a directory: {}", root.display());
        }
        Ok(Self {
            jail: Arc::new(FsJail {
                root: canonical,
                follow_outside,
            }),
        })
    }

    /// Canonical host path of the root.
    pub fn root(&self) -> &Path {
        &self.jail.root
    }
}

impl Storage for FsRoot {
    fn locate(&self, path: &RelativePath) -> Result<Location> {
        let mut fs_path = self.jail.root.clone();
        for segment in path.segments() {
            fs_path.push(segment);
        }
        let key = path.key();
        Ok(match self.jail.stat(&key, &fs_path)? {
            Some(meta) => Location::fs(key, meta, fs_path, Arc::clone(&self.jail)),
            None => Location::missing(key),
        })
    }
}

/// Enumerate a directory. Entries that cannot be read, have names that are
/// not valid UTF-8, or vanish or leave the root mid-listing are skipped.
pub(super) fn list(logical: &str, dir: &Path, jail: &Arc<FsJail>) -> Result<Vec<Location>> {
    let entries = fs::read_dir(dir).map_err(|e| host_fault(e, "read_dir", logical, dir))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %logical, error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let name = match entry.file_name().into_string() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(dir = %logical, "skipping entry with non UTF-8 name");
                continue;
            }
        };
        let fs_path = entry.path();
        let child = child_path(logical, &name);
        match jail.stat(&child, &fs_path) {
            Ok(Some(meta)) => out.push(Location::fs(child, meta, fs_path, Arc::clone(jail))),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(dir = %logical, name = %name, error = %format!("{e:#}"), "skipping unreadable entry");
            }
        }
    }
    Ok(out)
}

/// Positional read (pread-style on Unix). Errors name only `logical`.
#[cfg(unix)]
pub(super) fn read_range(logical: &str, path: &Path, offset: u64, len: u64) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| host_fault(e, "open", logical, path))?;
    let size = file
        .metadata()
        .map_err(|e| host_fault(e, "stat", logical, path))?
        .len();
    let end = offset.saturating_add(len).min(size);
    let want = end.saturating_sub(offset) as usize;
    let mut buf = vec![0u8; want];
    let mut filled = 0;
    while filled < want {
        let n = file
            .read_at(&mut buf[filled..], offset + filled as u64)
            .map_err(|e| host_fault(e, "read", logical, path))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Seek + read fallback for non-Unix targets.
#[cfg(not(unix))]
pub(super) fn read_range(logical: &str, path: &Path, offset: u64, len: u64) -> Result<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = File::open(path).map_err(|e| host_fault(e, "open", logical, path))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| host_fault(e, "seek", logical, path))?;
    let mut buf = Vec::new();
    file.take(len)
        .read_to_end(&mut buf)
        .map_err(|e| host_fault(e, "read", logical, path))?;
    Ok(buf)
}
