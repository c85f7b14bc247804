//! `statik ls` – look up a path as a request would and print the result.

use anyhow::{bail, Result};
use statik_core::config::StatikConfig;
use statik_core::listing::SortSpec;
use statik_core::{Lookup, StaticFiles};

pub fn run_ls(cfg: &StatikConfig, path: &str, context: Option<&str>, sort: Option<&str>) -> Result<()> {
    let files = StaticFiles::from_config(cfg)?;
    let context = context.unwrap_or(path);
    match files.lookup_sorted(path, context, SortSpec::from_query(sort))? {
        Lookup::Listing(page) => print!("{page}"),
        Lookup::Content(d) => println!(
            "{} ({}, {} bytes)",
            d.path(),
            d.content_type().unwrap_or("application/octet-stream"),
            d.len()
        ),
        Lookup::Forbidden => bail!("directory listing is disabled for {path}"),
        Lookup::NotFound => bail!("not found: {path}"),
    }
    Ok(())
}
