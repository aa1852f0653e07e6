use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::types::BoundingBox;

/// Crop an image to a pixel rectangle on the blocking pool.
pub async fn crop_image_async(
    img: Arc<DynamicImage>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || Ok(img.crop_imm(x, y, width, height)))
        .await
        .context("Failed to spawn blocking task for image cropping")?
}

/// Crop the region described by a normalized bounding box.
///
/// The box is mapped onto the image's pixel grid first; the resulting crop is
/// never empty.
pub async fn crop_to_bbox_async(img: Arc<DynamicImage>, bbox: BoundingBox) -> Result<DynamicImage> {
    let (x, y, width, height) = bbox.to_pixel_rect(img.width(), img.height());
    crop_image_async(img, x, y, width, height).await
}

/// Decode an image file on the blocking pool.
pub async fn load_image_async(path: impl Into<PathBuf>) -> Result<DynamicImage> {
    let path = path.into();
    tokio::task::spawn_blocking(move || {
        image::open(&path).with_context(|| format!("Failed to load image {}", path.display()))
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}
