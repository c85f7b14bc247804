//! Weak validation tags.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hex characters kept from the digest.
const TAG_HEX_LEN: usize = 16;

/// Weak tag (`W/"…"`) derived from length and modification time, so any
/// change the cache revalidation can observe also changes the tag.
pub fn weak_tag(len: u64, modified: SystemTime) -> String {
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(len.to_be_bytes());
    hasher.update(nanos.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("W/\"{}\"", &digest[..TAG_HEX_LEN])
}

/// Tag of a pre-encoded variant: the original tag with `--<encoding>` inside
/// the quotes (`W/"abc"` -> `W/"abc--gzip"`).
pub fn with_encoding(tag: &str, encoding: &str) -> String {
    match tag.strip_suffix('"') {
        Some(open) => format!("{open}--{encoding}\""),
        None => format!("{tag}--{encoding}"),
    }
}
