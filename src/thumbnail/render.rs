use image::imageops::FilterType;
use image::{GenericImageView, RgbaImage};
use std::path::Path;

use crate::error::{BrowserError, Result};

/// Turns a document into a thumbnail image.
///
/// Called from the blocking pool, possibly for several documents at once,
/// so implementations must be thread-safe.
pub trait ThumbnailRenderer: Send + Sync {
    /// Render `path` so that it fits within `max_size` (width, height)
    fn render(&self, path: &Path, max_size: [u32; 2]) -> Result<RgbaImage>;
}

/// Default renderer using the `image` crate.
///
/// Decodes the file, downscales it to fit the requested size (never
/// upscales) and returns RGBA8 pixels. Documents that are not images fail,
/// which leaves their cache entry `failed`.
#[derive(Debug, Clone)]
pub struct ImageThumbnailRenderer {
    /// Downscale filter
    pub filter: FilterType,
}

impl Default for ImageThumbnailRenderer {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl ImageThumbnailRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThumbnailRenderer for ImageThumbnailRenderer {
    fn render(&self, path: &Path, max_size: [u32; 2]) -> Result<RgbaImage> {
        let mut img = image::open(path).map_err(|e| BrowserError::render_failed(path, e))?;

        let max_w = max_size[0].max(1);
        let max_h = max_size[1].max(1);
        let (w, h) = img.dimensions();
        if w > max_w || h > max_h {
            img = img.resize(max_w, max_h, self.filter);
        }

        Ok(img.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscales_to_fit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        RgbaImage::from_pixel(400, 100, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let thumb = ImageThumbnailRenderer::new().render(&path, [220, 270]).unwrap();
        assert_eq!(thumb.width(), 220);
        assert!(thumb.height() <= 270);
    }

    #[test]
    fn test_small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbaImage::from_pixel(16, 8, image::Rgba([1, 2, 3, 4])).save(&path).unwrap();

        let thumb = ImageThumbnailRenderer::new().render(&path, [220, 270]).unwrap();
        assert_eq!(thumb.dimensions(), (16, 8));
    }

    #[test]
    fn test_non_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.rtf");
        std::fs::write(&path, b"{\\rtf1 hello}").unwrap();

        let err = ImageThumbnailRenderer::new().render(&path, [64, 64]).unwrap_err();
        assert!(matches!(err, BrowserError::ThumbnailRenderFailed { .. }));
    }
}
