//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image::ImageReader` with decoder limits |
//! | Resample | [`progressive_resize`](super::resample::progressive_resize) (Catmull-Rom) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured quality |
//! | Encode → PNG | `image::codecs::png::PngEncoder`, adaptive filtering |
//! | Encode → GIF, TIFF, WebP | `DynamicImage::write_to` |
//!
//! The derivative is encoded in [`ResampleParams::output`], which differs
//! from the source format only when an upload's declared type and content
//! disagree. Encoder settings are fixed so identical inputs give identical
//! bytes.

use super::backend::{BackendError, ImageBackend};
use super::formats;
use super::params::{Encoded, Quality, ResampleParams};
use super::probe;
use super::resample::progressive_resize;
use crate::types::Dimensions;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageEncoder, ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use tracing::debug;

/// Default decoder pixel budget (100 megapixels).
pub const DEFAULT_MAX_PIXELS: u64 = 100_000_000;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    max_pixels: u64,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_max_pixels(DEFAULT_MAX_PIXELS)
    }

    /// Refuse sources with more than `max_pixels` pixels.
    pub fn with_max_pixels(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        // Decoded RGBA16 is the widest buffer the decoders allocate.
        limits.max_alloc = Some(self.max_pixels.saturating_mul(8));
        limits
    }

    fn decode(&self, params: &ResampleParams) -> Result<DynamicImage, BackendError> {
        let dims = probe::probe_bytes(&params.source)
            .ok_or_else(|| BackendError::Decode("unrecognized image header".into()))?;
        if dims.pixels() > self.max_pixels {
            return Err(BackendError::Decode(format!(
                "{dims} exceeds the {} pixel limit",
                self.max_pixels
            )));
        }

        let mut reader = ImageReader::with_format(Cursor::new(&params.source[..]), params.format);
        reader.limits(self.limits());
        reader.decode().map_err(|e| match e {
            ImageError::Limits(l) => BackendError::Decode(format!("decoder limit: {l}")),
            other => BackendError::Decode(other.to_string()),
        })
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `img` as `format` with fixed settings.
pub fn encode(
    img: &DynamicImage,
    format: ImageFormat,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    let (width, height) = (img.width(), img.height());

    let result = match format {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut cursor, quality.value() as u8).write_image(
                rgb.as_raw(),
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
        }
        ImageFormat::Png => {
            PngEncoder::new_with_quality(&mut cursor, CompressionType::Default, PngFilter::Adaptive)
                .write_image(img.as_bytes(), width, height, img.color().into())
        }
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut cursor, format),
        other => match formats::from_image_format(other) {
            Some(info) if info.encode => img.write_to(&mut cursor, other),
            _ => {
                return Err(BackendError::Encode(format!("no encoder for {other:?}")));
            }
        },
    };
    result.map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(bytes)
}

impl ImageBackend for RustBackend {
    fn resample(&self, params: &ResampleParams) -> Result<Encoded, BackendError> {
        let info = formats::from_image_format(params.format);
        if !info.is_some_and(|i| i.decode) {
            return Err(BackendError::Decode(format!(
                "no decoder for {:?}",
                params.format
            )));
        }
        if !formats::from_image_format(params.output).is_some_and(|i| i.encode) {
            return Err(BackendError::Encode(format!(
                "no encoder for {:?}",
                params.output
            )));
        }

        let img = self.decode(params)?;
        debug!(
            from = %Dimensions::new(img.width(), img.height()),
            to = %params.target,
            from_format = ?params.format,
            to_format = ?params.output,
            "resampling"
        );
        let resized = progressive_resize(&img, params.target);
        let bytes = encode(&resized, params.output, params.quality)?;
        Ok(Encoded {
            bytes,
            dimensions: Dimensions::new(resized.width(), resized.height()),
        })
    }
}
