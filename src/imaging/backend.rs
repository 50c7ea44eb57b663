//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait covers the expensive part of producing a
//! derivative: decode, progressive resample, re-encode. Header probing is
//! cheap and lives in [`probe`](super::probe); it never goes through a backend.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and
//! statically linked into the binary.

use super::params::{Encoded, ResampleParams};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Resample timed out after {0:?}")]
    Timeout(Duration),
    #[error("Resample workers busy: {0}")]
    Busy(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image processing backends.
///
/// Implementations must be pure with respect to their input: the same
/// parameters produce the same output bytes.
pub trait ImageBackend: Send + Sync {
    /// Decode `params.source`, resample it to `params.target` and encode the
    /// result in `params.output`.
    fn resample(&self, params: &ResampleParams) -> Result<Encoded, BackendError>;
}
