//! Error type shared by every part of the browser core.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BrowserError>;

/// Everything that can go wrong while gathering, reconciling or rendering documents.
///
/// Per-item failures (`MalformedItem`, `ThumbnailRenderFailed`) are isolated by
/// their callers and never abort a whole batch.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The external indexing source cannot be queried; callers fall back to local enumeration
    #[error("document source unavailable: {0}")]
    SourceUnavailable(String),

    /// A raw record is missing a field required to build a document identity
    #[error("malformed item: {0}")]
    MalformedItem(String),

    /// Rendering a thumbnail failed; the cache entry becomes `failed` and is retried on next load
    #[error("thumbnail render failed for {path}: {reason}")]
    ThumbnailRenderFailed { path: PathBuf, reason: String },

    /// Two records in one batch resolved to the same identity (the later one wins)
    #[error("duplicate identity in batch: {0}")]
    DuplicateIdentity(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    /// Build a render failure for `path`
    pub fn render_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BrowserError::ThumbnailRenderFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
