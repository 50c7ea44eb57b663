//! Database blob store.
//!
//! Uploads are rows in SQLite. Each upload of a file creates a new
//! `file_version`; its bytes and those of every derivative live in
//! `file_data`, keyed by `(file_version_id, resized)` where `resized = 0` is
//! the original and any other value is a derivative's width.
//!
//! ```sql
//! file_version(file_version_id PK, file_id, filename, mime_type)
//! file_data(file_version_id, resized, width, height, data,
//!           PRIMARY KEY (file_version_id, resized))
//! ```
//!
//! Originals that are not images are stored with width and height `-1`. A
//! derivative row without usable dimensions is measured from its bytes when
//! it is served. Derivatives are encoded in the format of the version's MIME
//! type, or in the source's own format when the type names no image format.
//! Derivatives are written with an upsert, so generating one twice can never
//! produce two rows.

use super::{DerivativeGenerator, DerivativeStore, StoreError};
use crate::imaging::{formats, probe};
use crate::naming::{self, BlobRef};
use crate::types::{DerivativeKey, Dimensions, ImageReference, StoredImage};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS file_version (
        file_version_id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL,
        filename TEXT NOT NULL,
        mime_type TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS file_version_file_id ON file_version (file_id);
    CREATE TABLE IF NOT EXISTS file_data (
        file_version_id INTEGER NOT NULL REFERENCES file_version (file_version_id),
        resized INTEGER NOT NULL,
        width INTEGER NOT NULL,
        height INTEGER NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (file_version_id, resized)
    );
";

/// A `file_version` row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Version {
    file_version_id: i64,
    filename: String,
    mime_type: String,
}

/// Bytes of an original or derivative, as served to browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// `None` when the original is not an image.
    pub dimensions: Option<Dimensions>,
}

fn stored_dimensions(width: i64, height: i64) -> Option<Dimensions> {
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Dimensions::new(
        u32::try_from(width).ok()?,
        u32::try_from(height).ok()?,
    ))
}

pub struct BlobStore {
    conn: Mutex<Connection>,
    url_root: String,
    generator: DerivativeGenerator,
}

impl BlobStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(
        path: &Path,
        url_root: &str,
        generator: DerivativeGenerator,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?, url_root, generator)
    }

    /// Private in-memory database.
    pub fn open_in_memory(
        url_root: &str,
        generator: DerivativeGenerator,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, url_root, generator)
    }

    fn with_connection(
        conn: Connection,
        url_root: &str,
        generator: DerivativeGenerator,
    ) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            url_root: url_root.trim_end_matches('/').to_string(),
            generator,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Storage("database connection lock poisoned".into()))
    }

    /// Store a newly uploaded original and return its version id.
    pub fn insert_original(
        &self,
        file_id: i64,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<i64, StoreError> {
        let (width, height) = match probe::probe_bytes(bytes) {
            Some(d) => (i64::from(d.width), i64::from(d.height)),
            None => (-1, -1),
        };
        let mime_type = formats::normalize_mime(mime_type);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO file_version (file_id, filename, mime_type) VALUES (?1, ?2, ?3)",
            params![file_id, filename, mime_type],
        )?;
        let file_version_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO file_data (file_version_id, resized, width, height, data)
             VALUES (?1, 0, ?2, ?3, ?4)",
            params![file_version_id, width, height, bytes],
        )?;
        tx.commit()?;
        debug!(file_id, file_version_id, filename, "original stored");
        Ok(file_version_id)
    }

    /// Bytes of an original (`width: None`) or of an existing derivative.
    pub fn read(
        &self,
        file_id: i64,
        file_version_id: Option<i64>,
        width: Option<u32>,
    ) -> Result<Option<BlobData>, StoreError> {
        let version = self.version(file_id, file_version_id)?;
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT width, height, data FROM file_data
                 WHERE file_version_id = ?1 AND resized = ?2",
                params![version.file_version_id, width.unwrap_or(0)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(w, h, bytes)| BlobData {
            bytes,
            mime_type: version.mime_type,
            dimensions: stored_dimensions(w, h),
        }))
    }

    /// [`read`](Self::read) addressed by a reference string from
    /// [`naming::build_blob_reference`].
    pub fn read_reference(&self, reference: &str) -> Result<Option<BlobData>, StoreError> {
        let blob = naming::parse_blob_reference(reference)?;
        self.read(blob.file_id, blob.file_version_id, blob.width)
    }

    /// Resolve a version id, `None` meaning the newest version of the file.
    fn version(&self, file_id: i64, file_version_id: Option<i64>) -> Result<Version, StoreError> {
        let conn = self.conn()?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Version> {
            Ok(Version {
                file_version_id: row.get(0)?,
                filename: row.get(1)?,
                mime_type: row.get(2)?,
            })
        };
        let found = match file_version_id {
            Some(v) => conn
                .query_row(
                    "SELECT file_version_id, filename, mime_type FROM file_version
                     WHERE file_id = ?1 AND file_version_id = ?2",
                    params![file_id, v],
                    map,
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT file_version_id, filename, mime_type FROM file_version
                     WHERE file_id = ?1 ORDER BY file_version_id DESC LIMIT 1",
                    params![file_id],
                    map,
                )
                .optional()?,
        };
        found.ok_or_else(|| {
            StoreError::SourceNotFound(ImageReference::blob(file_id, file_version_id).to_string())
        })
    }

    fn ids(reference: &ImageReference) -> Result<(i64, Option<i64>), StoreError> {
        match reference {
            ImageReference::Blob {
                file_id,
                file_version_id,
            } => Ok((*file_id, *file_version_id)),
            ImageReference::File { path } => Err(StoreError::InvalidReference(format!(
                "{path} is a filesystem reference"
            ))),
        }
    }

    fn dimensions_of(
        &self,
        file_version_id: i64,
        resized: u32,
    ) -> Result<Option<(i64, i64)>, StoreError> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT width, height FROM file_data WHERE file_version_id = ?1 AND resized = ?2",
                params![file_version_id, resized],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?)
    }

    fn reference_for(
        &self,
        file_id: i64,
        requested_version: Option<i64>,
        width: Option<u32>,
        filename: &str,
    ) -> String {
        naming::build_blob_reference(&BlobRef::new(
            &self.url_root,
            file_id,
            requested_version,
            width,
            filename,
        ))
    }

    /// An already stored derivative. Rows written without usable dimensions
    /// are measured from their bytes.
    fn existing(
        &self,
        file_id: i64,
        requested_version: Option<i64>,
        version: &Version,
        target: Dimensions,
    ) -> Result<Option<StoredImage>, StoreError> {
        let (w, h) = match self.dimensions_of(version.file_version_id, target.width)? {
            Some(row) => row,
            None => return Ok(None),
        };
        let dimensions = match stored_dimensions(w, h) {
            Some(d) => d,
            None => self
                .read(file_id, Some(version.file_version_id), Some(target.width))?
                .and_then(|data| probe::probe_bytes(&data.bytes))
                .unwrap_or(target),
        };
        Ok(Some(StoredImage {
            reference: self.reference_for(
                file_id,
                requested_version,
                Some(target.width),
                &version.filename,
            ),
            dimensions,
        }))
    }

    fn upsert(
        &self,
        file_version_id: i64,
        width: u32,
        dimensions: Dimensions,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO file_data (file_version_id, resized, width, height, data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (file_version_id, resized) DO UPDATE SET
                 width = excluded.width, height = excluded.height, data = excluded.data",
            params![
                file_version_id,
                width,
                dimensions.width,
                dimensions.height,
                bytes
            ],
        )?;
        Ok(())
    }

    /// Number of stored rows (original plus derivatives) for a version.
    pub fn row_count(&self, file_version_id: i64) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM file_data WHERE file_version_id = ?1",
            params![file_version_id],
            |row| row.get(0),
        )?)
    }
}

impl DerivativeStore for BlobStore {
    fn original_dimensions(
        &self,
        reference: &ImageReference,
    ) -> Result<Option<Dimensions>, StoreError> {
        let (file_id, requested) = Self::ids(reference)?;
        let version = self.version(file_id, requested)?;
        match self.dimensions_of(version.file_version_id, 0)? {
            Some((w, h)) => Ok(stored_dimensions(w, h)),
            None => {
                warn!(%reference, "file version has no data");
                Err(StoreError::SourceNotFound(reference.to_string()))
            }
        }
    }

    fn original_reference(&self, reference: &ImageReference) -> Result<String, StoreError> {
        let (file_id, requested) = Self::ids(reference)?;
        let version = self.version(file_id, requested)?;
        Ok(self.reference_for(file_id, requested, None, &version.filename))
    }

    fn resolve(
        &self,
        reference: &ImageReference,
        target: Dimensions,
    ) -> Result<StoredImage, StoreError> {
        let (file_id, requested) = Self::ids(reference)?;
        // Derivatives belong to a concrete version even when the current one
        // was asked for.
        let version = self.version(file_id, requested)?;
        if let Some(hit) = self.existing(file_id, requested, &version, target)? {
            return Ok(hit);
        }

        let key = DerivativeKey::new(
            ImageReference::blob(file_id, Some(version.file_version_id)),
            target.width,
        );
        let flight = self.generator.flights().acquire(&key.flight_key())?;
        if let Some(hit) = self.existing(file_id, requested, &version, target)? {
            return Ok(hit);
        }

        flight.run(|| {
            let start = Instant::now();
            let source = self
                .read(file_id, Some(version.file_version_id), None)?
                .ok_or_else(|| StoreError::SourceNotFound(reference.to_string()))?;
            // An untyped upload is encoded as whatever its bytes are.
            let declared = formats::from_mime(&source.mime_type);
            let encoded = self
                .generator
                .generate(Arc::from(source.bytes), target, declared)?;
            self.upsert(
                version.file_version_id,
                target.width,
                encoded.dimensions,
                &encoded.bytes,
            )?;
            debug!(
                file_id,
                file_version_id = version.file_version_id,
                size = %encoded.dimensions,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "derivative stored"
            );
            Ok(StoredImage {
                reference: self.reference_for(
                    file_id,
                    requested,
                    Some(target.width),
                    &version.filename,
                ),
                dimensions: encoded.dimensions,
            })
        })
    }
}
