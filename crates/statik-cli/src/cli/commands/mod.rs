//! CLI command handlers, one per file.

mod config;
mod ls;
mod resolve;
mod watch;

pub use config::run_config;
pub use ls::run_ls;
pub use resolve::run_resolve;
pub use watch::run_watch;
