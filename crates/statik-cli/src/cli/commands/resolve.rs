//! `statik resolve` – print the descriptor for a request path.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use serde_json::{json, Value};
use statik_core::config::StatikConfig;
use statik_core::{Descriptor, StaticFiles};

pub fn run_resolve(cfg: &StatikConfig, path: &str, as_json: bool) -> Result<()> {
    let files = StaticFiles::from_config(cfg)?;
    let Some(found) = files.resolve(path)? else {
        bail!("no content at {path}");
    };
    if as_json {
        println!("{}", serde_json::to_string_pretty(&describe(&found))?);
        return Ok(());
    }

    let kind = if found.is_dir() { "directory" } else { "file" };
    println!("path:          {}", found.path());
    println!("kind:          {kind}");
    println!("content type:  {}", found.content_type().unwrap_or("-"));
    println!("length:        {}", found.len());
    println!("modified:      {}", unix_secs(found.modified()));
    println!("etag:          {}", found.etag());
    println!("mapped:        {}", found.is_mapped());
    println!("buffered:      {}", found.buffer().is_some());
    for (encoding, variant) in found.variants() {
        println!("variant:       {encoding} -> {} ({} bytes)", variant.path(), variant.len());
    }
    Ok(())
}

/// JSON view of a descriptor, variants included.
pub(super) fn describe(d: &Descriptor) -> Value {
    let variants: Vec<Value> = d
        .variants()
        .iter()
        .map(|(encoding, v)| {
            json!({
                "encoding": encoding,
                "path": v.path(),
                "length": v.len(),
                "etag": v.etag(),
                "mapped": v.is_mapped(),
            })
        })
        .collect();
    json!({
        "path": d.path(),
        "kind": if d.is_dir() { "dir" } else { "file" },
        "content_type": d.content_type(),
        "length": d.len(),
        "modified": unix_secs(d.modified()),
        "etag": d.etag(),
        "content_encoding": d.content_encoding(),
        "mapped": d.is_mapped(),
        "buffered": d.buffer().is_some(),
        "variants": variants,
    })
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
