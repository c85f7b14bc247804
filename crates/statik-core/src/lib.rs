//! Static content resolution: storage locations, a cached resolver chain
//! and directory listings.

pub mod cache;
pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod listing;
pub mod location;
pub mod logging;
pub mod service;

pub use content::{ContentResolver, Descriptor};
pub use error::ResolveError;
pub use service::{Lookup, StaticFiles};
