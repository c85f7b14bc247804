//! In-memory storage backend.
//!
//! Files are kept in a flat map keyed by normalized path; directories exist
//! implicitly wherever some file path has them as a prefix.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use super::{child_path, normalize, Location, RelativePath, Storage};

#[derive(Debug)]
pub(super) struct Blob {
    pub(super) data: Vec<u8>,
    pub(super) modified: SystemTime,
}

/// Shared, mutable in-memory tree. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Arc<RwLock<BTreeMap<String, Arc<Blob>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file. Locations handed out earlier keep the old bytes.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>, modified: SystemTime) -> Result<()> {
        let Some(rel) = normalize(path)? else {
            bail!("memory path escapes root: {path}");
        };
        if rel.is_root() {
            bail!("cannot store a file at the root");
        }
        let blob = Arc::new(Blob {
            data: data.into(),
            modified,
        });
        self.write().insert(rel.key(), blob);
        Ok(())
    }

    /// Remove a file; returns whether it existed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let Some(rel) = normalize(path)? else {
            return Ok(false);
        };
        Ok(self.write().remove(&rel.key()).is_some())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Blob>>> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<Blob>>> {
        self.files.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Directory prefix for range scans (`/` stays `/`, `/a` becomes `/a/`).
    fn dir_prefix(key: &str) -> String {
        if key == "/" {
            "/".to_string()
        } else {
            format!("{key}/")
        }
    }

    pub(super) fn list(&self, key: &str) -> Result<Vec<Location>> {
        let prefix = Self::dir_prefix(key);
        let files = self.read();
        let mut out: Vec<Location> = Vec::new();
        let mut last_dir: Option<String> = None;
        for (path, blob) in files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                None => out.push(Location::blob(path.clone(), Arc::clone(blob))),
                Some((dir, _)) => {
                    if last_dir.as_deref() == Some(dir) {
                        continue;
                    }
                    last_dir = Some(dir.to_string());
                    let dir_key = child_path(key, dir);
                    if files.contains_key(&dir_key) {
                        // A file already claims this name.
                        continue;
                    }
                    let modified = Self::newest_under(&files, &dir_key);
                    out.push(Location::mem_dir(dir_key, modified, self.clone()));
                }
            }
        }
        Ok(out)
    }

    fn newest_under(files: &BTreeMap<String, Arc<Blob>>, key: &str) -> SystemTime {
        let prefix = Self::dir_prefix(key);
        files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(_, b)| b.modified)
            .max()
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

impl Storage for MemoryStore {
    fn locate(&self, path: &RelativePath) -> Result<Location> {
        let key = path.key();
        let files = self.read();
        if let Some(blob) = files.get(&key) {
            return Ok(Location::blob(key, Arc::clone(blob)));
        }
        let prefix = Self::dir_prefix(&key);
        let is_dir = path.is_root()
            || files
                .range(prefix.clone()..)
                .next()
                .is_some_and(|(p, _)| p.starts_with(&prefix));
        if is_dir {
            let modified = Self::newest_under(&files, &key);
            drop(files);
            return Ok(Location::mem_dir(key, modified, self.clone()));
        }
        Ok(Location::missing(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Origin;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn files_and_implicit_directories() {
        let store = MemoryStore::new();
        store.insert("/a.txt", b"aaa".to_vec(), t(10)).unwrap();
        store.insert("/d/x.css", b"x".to_vec(), t(20)).unwrap();
        store.insert("/d/e/y.js", b"y".to_vec(), t(30)).unwrap();

        let f = store.resolve("/a.txt").unwrap();
        assert!(f.is_file());
        assert_eq!(f.origin(), Origin::Memory);
        assert_eq!(f.read_all().unwrap(), b"aaa");

        let d = store.resolve("/d").unwrap();
        assert!(d.is_dir());
        assert_eq!(d.modified(), Some(t(30)));
        let names: Vec<String> = d.children().unwrap().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["e", "x.css"]);

        let root = store.resolve("/").unwrap();
        let names: Vec<String> = root.children().unwrap().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["a.txt", "d"]);

        assert!(!store.resolve("/zzz").unwrap().exists());
        // "/d" must not match "/dx".
        store.insert("/dx", b"".to_vec(), t(1)).unwrap();
        assert!(store.resolve("/dx").unwrap().is_file());
    }

    #[test]
    fn snapshots_survive_replacement() {
        let store = MemoryStore::new();
        store.insert("/f", b"old".to_vec(), t(1)).unwrap();
        let before = store.resolve("/f").unwrap();
        store.insert("/f", b"newer".to_vec(), t(2)).unwrap();
        let after = store.resolve("/f").unwrap();
        assert_eq!(before.read_all().unwrap(), b"old");
        assert_eq!(after.read_all().unwrap(), b"newer");
        assert!(!before.same_snapshot(&after));
        assert!(store.remove("/f").unwrap());
        assert!(!store.resolve("/f").unwrap().exists());
    }

    #[test]
    fn insert_rejects_root_and_traversal() {
        let store = MemoryStore::new();
        assert!(store.insert("/", b"x".to_vec(), t(1)).is_err());
        assert!(store.insert("/../x", b"x".to_vec(), t(1)).is_err());
    }
}
