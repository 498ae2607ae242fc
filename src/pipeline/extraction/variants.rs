//! Enhanced grayscale variants of the working image for OCR.
//!
//! Handwritten and photographed prescriptions fail OCR for different reasons
//! (faint ink, uneven lighting, white-on-dark labels), so several enhancements
//! are produced and the local OCR sweep picks whichever reads best.
//!
//! All variants derive from one grayscale base that is upscaled once when the
//! image is below the legibility threshold. Every strategy except `gentle`
//! is optional and a failing strategy never aborts the others.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tracing::debug;

use super::preprocess::{mean_brightness, rgb_to_gray};
use super::types::{ImageVariant, WorkingImage};
use crate::config::VariantConfig;

pub const GENTLE: &str = "gentle";
pub const HIGH_CONTRAST: &str = "high-contrast";
pub const BINARIZED: &str = "binarized";
pub const INVERTED: &str = "inverted";
pub const SHARP: &str = "sharp";

/// Produce the ordered variant list. Never empty: `gentle` is always first.
pub fn generate_variants(working: &WorkingImage, config: &VariantConfig) -> Vec<ImageVariant> {
    let base = upscale_if_small(rgb_to_gray(working.as_rgb()), config);
    let brightness = mean_brightness(&base);

    let mut variants = vec![ImageVariant {
        label: GENTLE,
        image: gentle(&base),
    }];

    if config.high_contrast {
        variants.push(ImageVariant {
            label: HIGH_CONTRAST,
            image: high_contrast(&base),
        });
    }
    if config.binarized {
        variants.push(ImageVariant {
            label: BINARIZED,
            image: binarize(&base, brightness),
        });
    }
    if config.inverted && brightness < config.dark_background_threshold {
        variants.push(ImageVariant {
            label: INVERTED,
            image: inverted(&base),
        });
    }
    if config.sharp {
        variants.push(ImageVariant {
            label: SHARP,
            image: sharp(&base),
        });
    }

    debug!(
        base = format!("{}x{}", base.width(), base.height()),
        brightness,
        count = variants.len(),
        "Generated OCR variants"
    );

    variants
}

/// Upscale the base when its long edge is below the legibility threshold.
/// The factor is bounded by `max_upscale`.
fn upscale_if_small(base: GrayImage, config: &VariantConfig) -> GrayImage {
    let (w, h) = base.dimensions();
    let long_edge = w.max(h);
    if long_edge == 0 || long_edge >= config.legibility_threshold {
        return base;
    }

    let factor = (config.legibility_threshold as f32 / long_edge as f32).min(config.max_upscale);
    if factor <= 1.0 {
        return base;
    }

    let new_w = ((w as f32 * factor).round() as u32).max(1);
    let new_h = ((h as f32 * factor).round() as u32).max(1);
    debug!(factor, to = format!("{new_w}x{new_h}"), "Upscaling small image for OCR");
    imageops::resize(&base, new_w, new_h, FilterType::CatmullRom)
}

// ── strategies ────────────────────────────────────────────

/// Mild contrast boost and light sharpening.
fn gentle(base: &GrayImage) -> GrayImage {
    let boosted = imageops::contrast(base, 20.0);
    imageops::unsharpen(&boosted, 1.0, 3)
}

/// Histogram stretch, strong contrast, then sharpening.
fn high_contrast(base: &GrayImage) -> GrayImage {
    let stretched = stretch_contrast(base, 0.01);
    let boosted = imageops::contrast(&stretched, 60.0);
    imageops::unsharpen(&boosted, 1.5, 1)
}

/// Global mean threshold followed by a 3x3 median to remove speckle.
fn binarize(base: &GrayImage, mean: f32) -> GrayImage {
    let threshold = mean.round().clamp(1.0, 254.0) as u8;
    let mut bw = base.clone();
    for p in bw.pixels_mut() {
        p.0[0] = if p.0[0] >= threshold { 255 } else { 0 };
    }
    median_3x3(&bw)
}

/// Light text on a dark background becomes dark on light.
fn inverted(base: &GrayImage) -> GrayImage {
    let mut inv = base.clone();
    imageops::invert(&mut inv);
    imageops::contrast(&inv, 20.0)
}

/// Two sharpening passes and a small brightness lift for faint ink.
fn sharp(base: &GrayImage) -> GrayImage {
    let once = imageops::unsharpen(base, 2.0, 0);
    let twice = imageops::unsharpen(&once, 1.0, 0);
    imageops::brighten(&twice, 10)
}

// ── pixel helpers ─────────────────────────────────────────

/// Linear histogram stretch ignoring `cutoff` of the pixels at each end.
pub fn stretch_contrast(img: &GrayImage, cutoff: f32) -> GrayImage {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return img.clone();
    }

    let clip = (total as f32 * cutoff.clamp(0.0, 0.49)) as u64;
    let low = percentile_bound(histogram.iter().enumerate(), clip).unwrap_or(0);
    let high = percentile_bound(histogram.iter().enumerate().rev(), clip).unwrap_or(255);
    if high <= low {
        return img.clone();
    }

    let range = (high - low) as f32;
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = p.0[0].clamp(low, high);
        p.0[0] = (((v - low) as f32 / range) * 255.0).round() as u8;
    }
    out
}

fn percentile_bound<'a>(bins: impl Iterator<Item = (usize, &'a u64)>, clip: u64) -> Option<u8> {
    let mut seen = 0u64;
    for (value, count) in bins {
        seen += count;
        if seen > clip {
            return Some(value as u8);
        }
    }
    None
}

/// 3x3 median filter. Border pixels use the clamped neighbourhood.
pub fn median_3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return img.clone();
    }

    let mut out = GrayImage::new(w, h);
    let mut window = [0u8; 9];
    for y in 0..h {
        for x in 0..w {
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    window[i] = img.get_pixel(sx, sy).0[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}
