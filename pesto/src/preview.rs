//! Thumbnail generation for image and file captures.
//!
//! Decoding runs on blocking threads. Callers bound every call with a
//! deadline and store no preview when it fails or runs out of time.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;

/// Longest edge of a generated preview, in pixels
pub const PREVIEW_MAX_DIMENSION: u32 = 128;

/// Upper bound for one capture's preview work
pub const PREVIEW_TIMEOUT: Duration = Duration::from_secs(5);

const JPEG_QUALITY: u8 = 70;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Unsupported image data: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Preview task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Bitmap buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}")]
    BitmapSize {
        width: u32,
        height: u32,
        expected: u128,
        actual: usize,
    },
}

#[async_trait::async_trait]
pub trait PreviewGenerator: Send + Sync {
    /// Thumbnail for raw image bytes in any supported format
    async fn image_preview(&self, data: Vec<u8>, max_dimension: u32) -> Result<Vec<u8>, PreviewError>;

    /// Thumbnail for a file on disk. Non-image files fail with `Decode`.
    async fn file_preview(&self, path: PathBuf, max_dimension: u32) -> Result<Vec<u8>, PreviewError>;
}

/// Preview generator backed by the `image` crate. Emits JPEG thumbnails.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagePreviewGenerator;

impl ImagePreviewGenerator {
    fn thumbnail_jpeg(img: DynamicImage, max_dimension: u32) -> Result<Vec<u8>, PreviewError> {
        let thumbnail = if img.width() > max_dimension || img.height() > max_dimension {
            img.thumbnail(max_dimension, max_dimension)
        } else {
            img
        };

        // JPEG carries no alpha
        let rgb = DynamicImage::ImageRgb8(thumbnail.to_rgb8());
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), JPEG_QUALITY);
        rgb.write_with_encoder(encoder)?;
        Ok(buffer)
    }

    fn preview_from_path(path: &Path, max_dimension: u32) -> Result<Vec<u8>, PreviewError> {
        let img = image::open(path)?;
        Self::thumbnail_jpeg(img, max_dimension)
    }
}

#[async_trait::async_trait]
impl PreviewGenerator for ImagePreviewGenerator {
    async fn image_preview(&self, data: Vec<u8>, max_dimension: u32) -> Result<Vec<u8>, PreviewError> {
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&data)?;
            Self::thumbnail_jpeg(img, max_dimension)
        })
        .await?
    }

    async fn file_preview(&self, path: PathBuf, max_dimension: u32) -> Result<Vec<u8>, PreviewError> {
        tokio::task::spawn_blocking(move || Self::preview_from_path(&path, max_dimension)).await?
    }
}

/// Encode raw RGBA pixels as PNG.
///
/// The buffer must hold exactly `width * height * 4` bytes.
pub fn encode_rgba_png(width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>, PreviewError> {
    use image::ImageEncoder;

    let expected = u128::from(width) * u128::from(height) * 4;
    if expected != rgba.len() as u128 {
        return Err(PreviewError::BitmapSize {
            width,
            height,
            expected,
            actual: rgba.len(),
        });
    }

    let mut buffer = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buffer).write_image(
        rgba,
        width,
        height,
        image::ColorType::Rgba8.into(),
    )?;
    Ok(buffer)
}
