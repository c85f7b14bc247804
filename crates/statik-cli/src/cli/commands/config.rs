//! `statik config` – print the effective configuration.

use std::path::Path;

use anyhow::Result;
use statik_core::config::{self, StatikConfig};

pub fn run_config(cfg: &StatikConfig, explicit: Option<&Path>) -> Result<()> {
    let source = match explicit {
        Some(path) => path.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", source.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
