//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the derivative stores (which decide what to produce) and
//! the [`backend`](super::backend) (which does the actual pixel work). This
//! separation allows swapping backends (e.g. for testing with a mock) without
//! changing store logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`ResampleParams`]: everything needed for one derivative: source bytes,
//!   source and output formats, target dimensions, quality.
//! - [`Encoded`]: the backend's output: encoded bytes and their actual size.

use crate::types::Dimensions;
use image::ImageFormat;
use std::sync::Arc;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for producing one derivative.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampleParams {
    /// Encoded source image. Shared so a timed-out job can keep running on
    /// the pool without copying.
    pub source: Arc<[u8]>,
    /// Format the source bytes are actually in.
    pub format: ImageFormat,
    /// Format to encode the derivative in. Usually the same as `format`.
    pub output: ImageFormat,
    pub target: Dimensions,
    pub quality: Quality,
}

/// An encoded derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Dimensions of the encoded raster, which may differ from the requested
    /// target by rounding.
    pub dimensions: Dimensions,
}
