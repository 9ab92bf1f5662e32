//! Crop workflow
//!
//! After the uncropped image has been uploaded the picker opens a
//! [`CropWorkflow`]. The caller selects a [`CropArea`]; confirming
//! rasterizes that region onto a canvas of the final size and encodes a
//! [`DerivedBlob`] that is uploaded in place of the original.
//!
//! ```text
//! source (W x H) ──crop (x, y, cw, ch)──► region ──resize──► canvas (fw x fh)
//!
//! fw = final_width  or cw or W      cw = crop_width  or W
//! fh = final_height or ch or H      ch = crop_height or H
//! ```

use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::decode::DecodedImage;
use crate::error::{PickerError, PickerResult};
use crate::types::SelectedFile;

/// Header shown while the crop step waits for a selection.
pub const CROP_HEADER: &str = "Select crop area";

/// A rectangle selected on the source image, in source pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropArea {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub width: u32,
    pub height: u32,
}

impl CropArea {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x.saturating_add(width),
            y2: y.saturating_add(height),
            width,
            height,
        }
    }

    /// Saving is only possible once something has been selected.
    pub fn is_selected(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// How a cancelled crop affects the surrounding flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CropMode {
    /// Inline picker: cancelling returns to an empty picker
    #[default]
    Standalone,
    /// Picker inside a dialog: cancelling dismisses the dialog
    Modal,
}

/// Crop and resize parameters. Zero means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditParams {
    pub crop_x: u32,
    pub crop_y: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub final_width: u32,
    pub final_height: u32,
}

impl EditParams {
    /// Crop to `area` without resizing.
    pub fn from_area(area: &CropArea) -> Self {
        Self {
            crop_x: area.x1,
            crop_y: area.y1,
            crop_width: area.width,
            crop_height: area.height,
            final_width: area.width,
            final_height: area.height,
        }
    }

    pub fn with_final_size(mut self, width: u32, height: u32) -> Self {
        self.final_width = width;
        self.final_height = height;
        self
    }

    /// Fill in defaults for a source of `width` x `height`.
    pub fn resolve(&self, width: u32, height: u32) -> EditParams {
        let crop_width = if self.crop_width == 0 { width } else { self.crop_width };
        let crop_height = if self.crop_height == 0 { height } else { self.crop_height };
        EditParams {
            crop_x: self.crop_x,
            crop_y: self.crop_y,
            crop_width,
            crop_height,
            final_width: if self.final_width == 0 { crop_width } else { self.final_width },
            final_height: if self.final_height == 0 { crop_height } else { self.final_height },
        }
    }
}

/// A binary image produced on the client, distinct from the picked file.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedBlob {
    pub name: String,
    pub mime: String,
    pub body: Bytes,
    pub width: u32,
    pub height: u32,
}

impl DerivedBlob {
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn into_selected_file(self) -> SelectedFile {
        SelectedFile::new(self.name, self.mime, self.body)
    }
}

/// Crop `source` per `params` and encode the result.
///
/// The output keeps the source mime type when we can encode it and falls
/// back to PNG otherwise.
pub fn edit_image(
    source: &DecodedImage,
    params: &EditParams,
    name: &str,
    mime: &str,
) -> PickerResult<DerivedBlob> {
    let (src_w, src_h) = source.dimensions();
    let p = params.resolve(src_w, src_h);

    if p.crop_x >= src_w || p.crop_y >= src_h {
        return Err(PickerError::Crop(format!(
            "crop origin ({}, {}) lies outside the {}x{} image",
            p.crop_x, p.crop_y, src_w, src_h
        )));
    }
    let crop_w = p.crop_width.min(src_w - p.crop_x);
    let crop_h = p.crop_height.min(src_h - p.crop_y);

    let region = source.image().crop_imm(p.crop_x, p.crop_y, crop_w, crop_h);
    let canvas = if (crop_w, crop_h) == (p.final_width, p.final_height) {
        region
    } else {
        region.resize_exact(p.final_width, p.final_height, FilterType::Triangle)
    };

    let format = ImageFormat::from_mime_type(mime)
        .filter(|f| f.writing_enabled())
        .unwrap_or(ImageFormat::Png);
    let canvas = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(canvas.to_rgb8()),
        _ => canvas,
    };

    let mut out = Vec::new();
    canvas
        .write_to(&mut std::io::Cursor::new(&mut out), format)
        .map_err(|e| PickerError::Crop(format!("failed to encode cropped image: {}", e)))?;

    debug!(
        width = p.final_width,
        height = p.final_height,
        bytes = out.len(),
        "Encoded cropped image"
    );

    Ok(DerivedBlob {
        name: name.to_string(),
        mime: format.to_mime_type().to_string(),
        body: Bytes::from(out),
        width: p.final_width,
        height: p.final_height,
    })
}

/// State of the crop step for one uploaded image.
#[derive(Debug, Clone)]
pub struct CropWorkflow {
    source_url: String,
    file_name: String,
    mime: String,
    source: DecodedImage,
    area: Option<CropArea>,
    final_size: Option<(u32, u32)>,
}

impl CropWorkflow {
    pub fn new(
        source_url: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        source: DecodedImage,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            source,
            area: None,
            final_size: None,
        }
    }

    /// URL of the uncropped upload being cropped.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn header(&self) -> &'static str {
        CROP_HEADER
    }

    pub fn select_area(&mut self, area: CropArea) {
        self.area = Some(area);
    }

    pub fn clear_selection(&mut self) {
        self.area = None;
    }

    pub fn area(&self) -> Option<CropArea> {
        self.area
    }

    /// Scale the crop to an explicit output size.
    pub fn set_final_size(&mut self, width: u32, height: u32) {
        self.final_size = Some((width, height));
    }

    /// Whether the save action is enabled.
    pub fn can_save(&self) -> bool {
        self.area.is_some_and(|a| a.is_selected())
    }

    /// Rasterize the selected area.
    pub fn confirm(&self) -> PickerResult<DerivedBlob> {
        let area = self
            .area
            .filter(CropArea::is_selected)
            .ok_or_else(|| PickerError::Crop("no crop area selected".to_string()))?;

        let mut params = EditParams::from_area(&area);
        if let Some((w, h)) = self.final_size {
            params = params.with_final_size(w, h);
        }
        edit_image(&self.source, &params, &self.file_name, &self.mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_image, solid_png};

    fn source(w: u32, h: u32) -> DecodedImage {
        decode_image(&solid_png(w, h).unwrap(), "image/png").unwrap()
    }

    #[test]
    fn test_resolve_defaults() {
        let p = EditParams::default().resolve(800, 600);
        assert_eq!((p.crop_width, p.crop_height), (800, 600));
        assert_eq!((p.final_width, p.final_height), (800, 600));

        let p = EditParams::from_area(&CropArea::new(10, 10, 340, 255)).resolve(800, 600);
        assert_eq!((p.final_width, p.final_height), (340, 255));

        let p = EditParams::from_area(&CropArea::new(0, 0, 340, 255))
            .with_final_size(170, 0)
            .resolve(800, 600);
        assert_eq!((p.final_width, p.final_height), (170, 255));
    }

    #[test]
    fn test_edit_image_dimensions() {
        let src = source(800, 600);
        let params = EditParams::from_area(&CropArea::new(100, 50, 340, 255));

        let blob = edit_image(&src, &params, "pic.png", "image/png").unwrap();
        assert_eq!((blob.width, blob.height), (340, 255));
        assert_eq!(blob.mime, "image/png");

        let out = decode_image(&blob.body, &blob.mime).unwrap();
        assert_eq!(out.dimensions(), (340, 255));
    }

    #[test]
    fn test_edit_image_resizes_to_final() {
        let src = source(400, 400);
        let params = EditParams::from_area(&CropArea::new(0, 0, 200, 200)).with_final_size(50, 25);

        let blob = edit_image(&src, &params, "pic.jpg", "image/jpeg").unwrap();
        assert_eq!(blob.mime, "image/jpeg");
        let out = decode_image(&blob.body, &blob.mime).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn test_unsupported_output_falls_back_to_png() {
        let src = source(20, 20);
        let params = EditParams::from_area(&CropArea::new(0, 0, 10, 10));

        let blob = edit_image(&src, &params, "pic.bmp", "image/bmp").unwrap();
        assert_eq!(blob.mime, "image/png");
    }

    #[test]
    fn test_origin_outside_image() {
        let src = source(20, 20);
        let params = EditParams::from_area(&CropArea::new(25, 0, 5, 5));
        assert!(matches!(
            edit_image(&src, &params, "x.png", "image/png"),
            Err(PickerError::Crop(_))
        ));
    }

    #[test]
    fn test_save_disabled_without_area() {
        let mut wf = CropWorkflow::new("https://b/x.png", "x.png", "image/png", source(30, 30));
        assert!(!wf.can_save());
        assert!(wf.confirm().is_err());

        wf.select_area(CropArea::new(0, 0, 0, 10));
        assert!(!wf.can_save());

        wf.select_area(CropArea::new(5, 5, 10, 10));
        assert!(wf.can_save());
        let blob = wf.confirm().unwrap();
        assert_eq!((blob.width, blob.height), (10, 10));
        assert_eq!(blob.name, "x.png");
    }
}
