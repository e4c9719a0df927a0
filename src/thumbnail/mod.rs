/// Thumbnail module
///
/// This module handles:
/// - Rendering document thumbnails (render.rs)
/// - Caching them by document identity and reporting finished loads (cache.rs)

pub mod cache;
pub mod render;

pub use cache::{ThumbnailCache, ThumbnailConfig, ThumbnailEvent, ThumbnailLookup, ThumbnailState};
pub use render::{ImageThumbnailRenderer, ThumbnailRenderer};
