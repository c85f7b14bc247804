//! Temporary directory trees for integration tests.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// Build a tree from `(relative path, contents)` pairs. A path ending in `/`
/// creates an empty directory; parent directories are created as needed.
pub fn tree(entries: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    add(dir.path(), entries);
    dir
}

/// Add entries to an existing tree.
pub fn add(root: &Path, entries: &[(&str, &[u8])]) {
    for (rel, data) in entries {
        let path = root.join(rel.trim_end_matches('/'));
        if rel.ends_with('/') {
            fs::create_dir_all(&path).expect("create dir");
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, data).expect("write file");
    }
}
