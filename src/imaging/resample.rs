//! Progressive downscaling.
//!
//! A single large-ratio resize rings and aliases. Instead the raster is
//! halved repeatedly with a bicubic (Catmull-Rom) filter, following the sizes
//! planned by [`halving_steps`], until it reaches the target exactly.

use super::calculations::halving_steps;
use crate::types::Dimensions;
use image::DynamicImage;
use image::imageops::FilterType;

/// Working buffer for `source`: 8-bit RGBA if it has an alpha channel,
/// 8-bit RGB otherwise.
fn working_buffer(source: &DynamicImage) -> DynamicImage {
    if source.color().has_alpha() {
        DynamicImage::ImageRgba8(source.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(source.to_rgb8())
    }
}

/// Resample `source` to exactly `target`.
pub fn progressive_resize(source: &DynamicImage, target: Dimensions) -> DynamicImage {
    let start = Dimensions::new(source.width(), source.height());
    let mut current = working_buffer(source);
    for step in halving_steps(start, target) {
        current = current.resize_exact(step.width, step.height, FilterType::CatmullRom);
    }
    current
}
