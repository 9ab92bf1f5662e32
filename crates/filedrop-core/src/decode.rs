//! Client-side image decoding.
//!
//! Images are decoded before upload so unreadable files are caught early
//! and so the crop step has pixels to work with.

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::error::{PickerError, PickerResult, IMAGE_DECODE_MESSAGE};

/// A decoded raster image together with the format it came from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    /// Natural width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Natural height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Decode `bytes`, trusting `mime` first and sniffing the header second.
pub fn decode_image(bytes: &[u8], mime: &str) -> PickerResult<DecodedImage> {
    let format = ImageFormat::from_mime_type(mime)
        .filter(|f| f.reading_enabled())
        .or_else(|| image::guess_format(bytes).ok())
        .ok_or_else(|| {
            debug!(mime, "No decoder for image");
            PickerError::ImageDecode(IMAGE_DECODE_MESSAGE.to_string())
        })?;

    let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        debug!(mime, error = %e, "Image decode failed");
        PickerError::ImageDecode(IMAGE_DECODE_MESSAGE.to_string())
    })?;

    Ok(DecodedImage { image, format })
}

/// [`decode_image`] on the blocking pool.
pub async fn decode_image_async(body: Bytes, mime: String) -> PickerResult<DecodedImage> {
    tokio::task::spawn_blocking(move || decode_image(&body, &mime))
        .await
        .map_err(|e| PickerError::InvalidOperation(format!("decode task failed: {}", e)))?
}

/// Encode a small solid PNG fixture.
#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32) -> PickerResult<Vec<u8>> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| PickerError::Crop(e.to_string()))?;
    Ok(out)
}
