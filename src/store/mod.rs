//! Derivative storage.
//!
//! A [`DerivativeStore`] answers one question: given an original and a
//! quantized target size, where are the bytes of that derivative? It checks
//! for an existing derivative first and only resamples on a miss, so a second
//! request for the same [`DerivativeKey`] never does pixel work.
//!
//! Two backends implement the trait, chosen once at startup from
//! [`StorageConfig::backend`](crate::config::StorageConfig):
//!
//! | Backend | Originals | Derivatives |
//! |---|---|---|
//! | [`FilesystemStore`] | files under `upload_dir` | `upload_dir/resized_subdir/...-{w}px.ext` |
//! | [`BlobStore`] | `file_data` rows, `resized = 0` | `file_data` rows, `resized = width` |
//!
//! Generation is serialized per key through [`SingleFlight`]: concurrent
//! misses on one derivative share a single resample, and its failure.
//!
//! Derivatives are encoded in the format their name declares (the upload's
//! extension, or the blob row's MIME type). The bytes are only sniffed to pick
//! a decoder, and to choose the output when nothing usable is declared.

pub mod blob;
pub mod filesystem;
mod flight;

pub use blob::{BlobData, BlobStore};
pub use filesystem::FilesystemStore;
pub use flight::{FlightGuard, SingleFlight};

use crate::config::{Config, StorageBackend};
use crate::imaging::{
    BackendError, Encoded, FormatInfo, ImageBackend, Quality, ResampleParams, ResampleWorker,
    RustBackend, formats, probe,
};
use crate::naming::NamingError;
use crate::types::{Dimensions, ImageReference, StoredImage};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failures of derivative resolution. Every variant is recoverable by the
/// caller; see [`ImageResolver::render`](crate::resolver::ImageResolver::render).
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("resample timed out after {0:?}")]
    Timeout(Duration),
    #[error("resampling unavailable: {0}")]
    Busy(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

impl From<BackendError> for StoreError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Encode(m) => StoreError::UnsupportedFormat(m),
            BackendError::Timeout(t) => StoreError::Timeout(t),
            BackendError::Busy(m) => StoreError::Busy(m),
            BackendError::Io(e) => StoreError::Decode(e.to_string()),
            BackendError::Decode(m) | BackendError::ProcessingFailed(m) => StoreError::Decode(m),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<NamingError> for StoreError {
    fn from(e: NamingError) -> Self {
        StoreError::InvalidReference(e.to_string())
    }
}

/// Capability shared by the storage backends.
pub trait DerivativeStore: Send + Sync {
    /// Dimensions of the original, read from its headers. `Ok(None)` when the
    /// original exists but is not an image.
    fn original_dimensions(
        &self,
        reference: &ImageReference,
    ) -> Result<Option<Dimensions>, StoreError>;

    /// Reference to the unresized original.
    fn original_reference(&self, reference: &ImageReference) -> Result<String, StoreError>;

    /// Find the derivative of `reference` at `target`, producing and storing
    /// it first if it doesn't exist yet. `target.width` is the quantized width
    /// that names the derivative.
    fn resolve(
        &self,
        reference: &ImageReference,
        target: Dimensions,
    ) -> Result<StoredImage, StoreError>;
}

/// Turns source bytes into derivative bytes: format detection, worker pool,
/// and the single-flight table shared by every key of one store.
pub struct DerivativeGenerator {
    worker: ResampleWorker,
    quality: Quality,
    flights: SingleFlight,
}

impl DerivativeGenerator {
    pub fn new(worker: ResampleWorker, quality: Quality) -> Self {
        Self {
            worker,
            quality,
            flights: SingleFlight::new(),
        }
    }

    /// Generator over the production backend, sized from `config`.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let backend: Arc<dyn ImageBackend> = Arc::new(RustBackend::with_max_pixels(
            config.processing.max_source_pixels,
        ));
        let worker = ResampleWorker::new(backend, &config.processing)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self::new(worker, Quality::new(config.resize.quality)))
    }

    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    /// Resample `source` to `target`.
    ///
    /// The derivative is encoded as `declared` when that format can be
    /// written, otherwise in whatever format the bytes turn out to be.
    pub fn generate(
        &self,
        source: Arc<[u8]>,
        target: Dimensions,
        declared: Option<&'static FormatInfo>,
    ) -> Result<Encoded, StoreError> {
        let sniffed = image::guess_format(&source)
            .ok()
            .and_then(formats::from_image_format)
            .ok_or_else(|| StoreError::Decode("unrecognized image format".into()))?;
        if !sniffed.decode {
            return Err(StoreError::Decode(format!("no decoder for {}", sniffed.mime)));
        }
        let output = match declared {
            Some(info) if info.encode => info,
            _ => sniffed,
        };
        if output.format != sniffed.format {
            warn!(
                declared = output.mime,
                actual = sniffed.mime,
                "source bytes do not match declared format"
            );
        }
        if !output.encode {
            return Err(StoreError::UnsupportedFormat(format!(
                "no encoder for {}",
                output.mime
            )));
        }
        let source_dims = probe::probe_bytes(&source)
            .ok_or_else(|| StoreError::Decode("unreadable image header".into()))?;

        let params = ResampleParams {
            source,
            format: sniffed.format,
            output: output.format,
            target,
            quality: self.quality,
        };
        Ok(self.worker.run(params, source_dims)?)
    }
}

/// Open the store selected by `config.storage.backend`, relative to `base`.
pub fn open(config: &Config, base: &Path) -> Result<Arc<dyn DerivativeStore>, StoreError> {
    let generator = DerivativeGenerator::from_config(config)?;
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Filesystem => Ok(Arc::new(FilesystemStore::new(
            base.join(&storage.upload_dir),
            &storage.resized_subdir,
            generator,
        ))),
        StorageBackend::Database => Ok(Arc::new(BlobStore::open(
            &base.join(&storage.database),
            &storage.url_root,
            generator,
        )?)),
    }
}
