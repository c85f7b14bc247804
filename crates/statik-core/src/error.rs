//! Error type surfaced at the resolver boundary.
//!
//! Everything below the boundary works with `anyhow::Error`; the single
//! translation point is [`sanitize_fault`].

use thiserror::Error;

/// Boxed cause retained for diagnostics.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure returned by a content resolver.
///
/// A missing resource is not an error (resolvers return `Ok(None)`); this type
/// only covers faults. The message carries the request path exactly as the
/// caller supplied it and nothing else.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid request path: {path}")]
    InvalidRequestPath {
        path: String,
        #[source]
        source: Cause,
    },
}

impl ResolveError {
    /// The request path the caller asked for.
    pub fn path(&self) -> &str {
        match self {
            ResolveError::InvalidRequestPath { path, .. } => path,
        }
    }
}

/// Convert an internal fault into the sanitized boundary error.
///
/// The cause chain may name absolute paths, so it is only logged at debug
/// level and kept as `source`; it never reaches `Display` or the warning.
pub fn sanitize_fault(path_in_context: &str, fault: anyhow::Error) -> ResolveError {
    tracing::warn!(path = %path_in_context, "resolution fault");
    tracing::debug!(path = %path_in_context, error = %format!("{fault:#}"), "resolution fault cause");
    ResolveError::InvalidRequestPath {
        path: path_in_context.to_string(),
        source: fault.into(),
    }
}

/// Run `f` and translate any fault through [`sanitize_fault`].
pub fn guard<T>(
    path_in_context: &str,
    f: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, ResolveError> {
    f().map_err(|fault| sanitize_fault(path_in_context, fault))
}
