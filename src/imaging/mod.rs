//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Probe** | `image::ImageReader::into_dimensions`, `avif-parse` |
//! | **Plan** | [`plan_scale`], [`quantize`] (pure math) |
//! | **Resample** | progressive halving, Catmull-Rom filter |
//! | **Encode** | `image` crate encoders, same format as the source |
//!
//! The module is split into:
//! - **Formats**: registry of MIME types and extensions with their capabilities
//! - **Probe**: header-only dimension reading
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a resample job
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Worker**: bounded pool running backend jobs under a timeout

pub mod backend;
mod calculations;
pub mod formats;
mod params;
pub mod probe;
mod resample;
pub mod rust_backend;
pub mod worker;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{Quantized, halving_steps, plan_scale, quantize};
pub use formats::FormatInfo;
pub use params::{Encoded, Quality, ResampleParams};
pub use probe::{is_image, probe_bytes, probe_file};
pub use resample::progressive_resize;
pub use rust_backend::RustBackend;
pub use worker::ResampleWorker;
