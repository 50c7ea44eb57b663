//! Shared test utilities for the wiki-imaging test suite.
//!
//! Tests never ship binary fixtures: every image is synthesized here with the
//! `image` crate, so sizes and formats are explicit at the call site.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! write_image(&tmp.path().join("en/cat.jpg"), 800, 400, ImageFormat::Jpeg);
//! let png = encode_png_rgba(64, 64);
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

/// An opaque gradient, busy enough that encoders can't collapse it.
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x * 31 + y * 17) % 256) as u8,
        ])
    })
}

/// Encode an opaque gradient as `format`.
pub fn encode_rgb(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = match format {
        // The GIF encoder only takes RGBA input.
        ImageFormat::Gif => {
            DynamicImage::ImageRgba8(DynamicImage::ImageRgb8(gradient_rgb(width, height)).to_rgba8())
        }
        _ => DynamicImage::ImageRgb8(gradient_rgb(width, height)),
    };
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// A PNG whose left half is fully transparent.
pub fn encode_png_rgba(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([(x % 256) as u8, (y % 256) as u8, 200, alpha])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

// =========================================================================
// Fixture setup
// =========================================================================

/// Write a synthetic image to `path`, creating parent directories.
pub fn write_image(path: &Path, width: u32, height: u32, format: ImageFormat) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, encode_rgb(width, height, format)).unwrap();
}
