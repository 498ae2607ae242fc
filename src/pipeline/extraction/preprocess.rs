//! Image normalization: raw upload bytes to a [`WorkingImage`].
//!
//! Decode, fix EXIF orientation, flatten transparency onto white, convert to
//! RGB, then cap the long edge. Every later stage (variants, vision upload)
//! reads the result, so this is the only place a photo's memory footprint is
//! decided.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use tracing::debug;

use super::types::WorkingImage;
use super::ExtractionError;
use crate::config::{NormalizerConfig, ResizeQuality};

/// Normalizes uploads into working images under a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Decode and normalize. Fails only when the bytes are not a decodable
    /// raster; the decoder alone decides that.
    pub fn normalize(&self, image_bytes: &[u8]) -> Result<WorkingImage, ExtractionError> {
        let img = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::Decode(e.to_string()))?;
        let (orig_w, orig_h) = img.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(ExtractionError::Decode("Image has zero area".into()));
        }

        let img = if self.config.apply_exif_orientation {
            apply_orientation(img, read_exif_orientation(image_bytes))
        } else {
            img
        };

        // The decoded DynamicImage is consumed here; only the RGB copy survives.
        let rgb = flatten_onto_white(img);
        let rgb = cap_resolution(rgb, self.config.max_dimension, self.config.resize_filter);

        debug!(
            original = format!("{orig_w}x{orig_h}"),
            working = format!("{}x{}", rgb.width(), rgb.height()),
            "Image normalized"
        );

        Ok(WorkingImage::new(rgb, orig_w, orig_h))
    }
}

/// Convenience wrapper around [`ImageNormalizer::normalize`].
pub fn normalize_image(
    image_bytes: &[u8],
    config: &NormalizerConfig,
) -> Result<WorkingImage, ExtractionError> {
    ImageNormalizer::new(config.clone()).normalize(image_bytes)
}

// ═══════════════════════════════════════════════════════════
// Orientation
// ═══════════════════════════════════════════════════════════

/// Read EXIF tag 0x0112 (Orientation) from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation transform.
///
/// 1 = Normal, 2 = Mirrored, 3 = 180deg, 4 = Flipped V,
/// 5 = Mirrored + 90deg CW, 6 = 90deg CW, 7 = Mirrored + 270deg CW, 8 = 270deg CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Pixel helpers
// ═══════════════════════════════════════════════════════════

/// Composite any alpha channel over white and drop it.
/// Transparent PNG scans otherwise turn black under a plain RGB conversion.
pub fn flatten_onto_white(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, p) in rgba.enumerate_pixels() {
        let alpha = p.0[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(p.0[0]), blend(p.0[1]), blend(p.0[2])]));
    }
    out
}

/// Downscale so the long edge fits `max_dim`, preserving aspect ratio.
/// Images already inside the ceiling are returned untouched.
pub fn cap_resolution(img: RgbImage, max_dim: u32, quality: ResizeQuality) -> RgbImage {
    let (w, h) = img.dimensions();
    let largest = w.max(h);
    if largest <= max_dim || max_dim == 0 {
        return img;
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, max_dim);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, max_dim);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Downscaling oversized image"
    );

    image::imageops::resize(&img, new_w, new_h, resize_filter(quality))
}

pub(crate) fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::High => FilterType::CatmullRom,
        ResizeQuality::Fast => FilterType::Triangle,
    }
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = (rgb.width(), rgb.height());
    let mut gray = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let p = rgb.get_pixel(x, y);
            let luma = (0.299 * p.0[0] as f32
                + 0.587 * p.0[1] as f32
                + 0.114 * p.0[2] as f32) as u8;
            gray.put_pixel(x, y, Luma([luma]));
        }
    }
    gray
}

/// Mean pixel value of a grayscale image (0.0 for an empty image).
pub fn mean_brightness(img: &GrayImage) -> f32 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f64 / count as f64) as f32
}

/// Encode a grayscale image as PNG bytes (OCR engine input).
pub fn encode_gray_png(img: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    encode(DynamicImage::ImageLuma8(img.clone()), ImageOutputFormat::Png)
}

/// Encode an RGB image as JPEG bytes (vision model upload).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, ExtractionError> {
    encode(
        DynamicImage::ImageRgb8(img.clone()),
        ImageOutputFormat::Jpeg(quality.clamp(1, 100)),
    )
}

fn encode(dynamic: DynamicImage, format: ImageOutputFormat) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, format)
        .map_err(|e| ExtractionError::ImageProcessing(format!("Image encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
