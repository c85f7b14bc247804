//! CLI for inspecting statik content resolution.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use statik_core::config::{self, StatikConfig};
use std::path::PathBuf;

use commands::{run_config, run_ls, run_resolve, run_watch};

/// Top-level CLI for the statik resolver.
#[derive(Debug, Parser)]
#[command(name = "statik")]
#[command(about = "statik: resolve, cache and list static content", long_about = None)]
pub struct Cli {
    /// Use this config file instead of ~/.config/statik/config.toml.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Storage root; repeat for an overlay (first wins). Overrides config roots.
    #[arg(long = "root", global = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Resolve a request path and print its descriptor.
    Resolve {
        /// Request path, e.g. /docs/index.html.
        path: String,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Look up a path the way a request would: file, welcome file or listing.
    Ls {
        /// Request path of a file or directory.
        path: String,
        /// URL prefix the listing is served under (defaults to the path).
        #[arg(long, value_name = "URL")]
        context: Option<String>,
        /// Listing order as a query string, e.g. "C=M&O=D".
        #[arg(long, value_name = "QUERY")]
        sort: Option<String>,
    },

    /// Re-resolve a path periodically and report changes seen through the cache.
    Watch {
        /// Request path to poll.
        path: String,
        /// Poll period in milliseconds.
        #[arg(long, default_value = "500", value_name = "MS")]
        interval_ms: u64,
        /// Stop after N polls (0 = until interrupted).
        #[arg(long, default_value = "0", value_name = "N")]
        count: u64,
    },

    /// Show the effective configuration.
    Config,
}

impl Cli {
    /// Effective configuration: explicit file or XDG default, with `--root`
    /// taking precedence over configured roots.
    pub fn load_config(&self) -> Result<StatikConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_from_path(path)?,
            None => config::load_or_init()?,
        };
        if !self.roots.is_empty() {
            cfg.roots = self.roots.clone();
        }
        cfg.validated()
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = cli.load_config()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Resolve { path, json } => run_resolve(&cfg, &path, json)?,
            CliCommand::Ls {
                path,
                context,
                sort,
            } => run_ls(&cfg, &path, context.as_deref(), sort.as_deref())?,
            CliCommand::Watch {
                path,
                interval_ms,
                count,
            } => run_watch(&cfg, &path, interval_ms, count).await?,
            CliCommand::Config => run_config(&cfg, cli.config.as_deref())?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
