//! Document browser core
//!
//! Keeps a sorted, de-duplicated list of documents in step with a live
//! metadata source (or a local directory when the source is unavailable),
//! reports every change as a sequence of edit operations, tracks recently
//! opened documents and caches their thumbnails.

pub mod browser;
pub mod config;
pub mod error;
pub mod query;
pub mod state;
pub mod thumbnail;

pub use browser::{BrowserEntry, DocumentBrowser, IndexPath, Presenter, Section};
pub use config::BrowserConfig;
pub use error::{BrowserError, Result};
pub use query::{DiffPolicy, EditOperation, QueryEngine, QueryUpdate, SourceMode};
pub use state::document::{DocumentId, DocumentIdentity, RawItem};
pub use state::results::ResultSet;
pub use thumbnail::{ImageThumbnailRenderer, ThumbnailCache, ThumbnailEvent, ThumbnailRenderer};
