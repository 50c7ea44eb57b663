//! Filesystem derivative store.
//!
//! Originals live under the upload directory at their relative path;
//! derivatives mirror that path under the resized sub-directory (see
//! [`naming::derivative_path`]). A derivative exists iff its file exists.
//!
//! Derivatives are encoded in the format the original's extension names, so
//! `cat-400px.jpg` always holds JPEG bytes even if `cat.jpg` was really a PNG.
//!
//! Writes go to a temporary file in the destination directory and are renamed
//! into place, so readers never see a partially written derivative.

use super::{DerivativeGenerator, DerivativeStore, StoreError};
use crate::imaging::{formats, probe};
use crate::naming;
use crate::types::{DerivativeKey, Dimensions, ImageReference, StoredImage};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub struct FilesystemStore {
    upload_dir: PathBuf,
    resized_subdir: String,
    generator: DerivativeGenerator,
}

impl FilesystemStore {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        resized_subdir: &str,
        generator: DerivativeGenerator,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            resized_subdir: resized_subdir.trim_matches('/').to_string(),
            generator,
        }
    }

    fn relative_path(&self, reference: &ImageReference) -> Result<String, StoreError> {
        match reference {
            ImageReference::File { path } => Ok(naming::normalize_relative_path(path)?),
            ImageReference::Blob { .. } => Err(StoreError::InvalidReference(format!(
                "{reference} is a database reference"
            ))),
        }
    }

    fn existing(&self, relative: &str, fallback: Dimensions) -> Option<StoredImage> {
        let path = self.upload_dir.join(relative);
        if !path.is_file() {
            return None;
        }
        let dimensions = probe::probe_file(&path).ok().flatten().unwrap_or(fallback);
        Some(StoredImage {
            reference: relative.to_string(),
            dimensions,
        })
    }

    fn read_source(&self, relative: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(self.upload_dir.join(relative)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::SourceNotFound(relative.to_string()),
            _ => StoreError::Decode(format!("{relative}: {e}")),
        })
    }

    fn persist(&self, relative: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let storage = |e: io::Error| StoreError::Storage(format!("{relative}: {e}"));
        let path = self.upload_dir.join(relative);
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Storage(format!("{relative}: no parent directory")))?;
        fs::create_dir_all(parent).map_err(storage)?;
        let mut tmp = NamedTempFile::new_in(parent).map_err(storage)?;
        tmp.write_all(bytes).map_err(storage)?;
        tmp.persist(&path).map_err(|e| storage(e.error))?;
        Ok(())
    }
}

impl DerivativeStore for FilesystemStore {
    fn original_dimensions(
        &self,
        reference: &ImageReference,
    ) -> Result<Option<Dimensions>, StoreError> {
        let relative = self.relative_path(reference)?;
        match probe::probe_file(&self.upload_dir.join(&relative)) {
            Ok(dims) => Ok(dims),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %relative, "original not found");
                Err(StoreError::SourceNotFound(relative))
            }
            Err(e) => Err(StoreError::Decode(format!("{relative}: {e}"))),
        }
    }

    fn original_reference(&self, reference: &ImageReference) -> Result<String, StoreError> {
        self.relative_path(reference)
    }

    fn resolve(
        &self,
        reference: &ImageReference,
        target: Dimensions,
    ) -> Result<StoredImage, StoreError> {
        let relative = self.relative_path(reference)?;
        let derived = naming::derivative_path(&self.resized_subdir, &relative, target.width);
        if let Some(hit) = self.existing(&derived, target) {
            return Ok(hit);
        }

        let key = DerivativeKey::new(ImageReference::file(relative.clone()), target.width);
        let flight = self.generator.flights().acquire(&key.flight_key())?;
        if let Some(hit) = self.existing(&derived, target) {
            return Ok(hit);
        }

        flight.run(|| {
            let start = Instant::now();
            let source = self.read_source(&relative)?;
            let declared =
                naming::extension_of(&relative).and_then(|e| formats::from_extension(&e));
            let encoded = self
                .generator
                .generate(Arc::from(source), target, declared)?;
            self.persist(&derived, &encoded.bytes)?;
            debug!(
                path = %derived,
                size = %encoded.dimensions,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "derivative written"
            );
            Ok(StoredImage {
                reference: derived.clone(),
                dimensions: encoded.dimensions,
            })
        })
    }
}
