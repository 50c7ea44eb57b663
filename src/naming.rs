//! Reference naming for derivatives.
//!
//! Every cached derivative has exactly one name, computed from its source
//! reference and quantized width. Two layouts exist, one per storage backend:
//!
//! ## Filesystem
//!
//! The derivative mirrors the original's relative path under the resized
//! sub-directory, with the width spliced in before the extension:
//! - `/en/2010/10/cat.jpg` @ 400 → `resized/en/2010/10/cat-400px.jpg`
//! - `notes/README` @ 200 → `resized/notes/README-200px`
//! - `draft.` @ 200 → `resized/draft-200px.`
//!
//! Any dot after the first character starts the extension, even when the
//! extension is empty, so the last dot of a derivative name always follows
//! the `-{width}px` suffix. That keeps the mapping reversible and therefore
//! collision-free.
//!
//! ## Blob
//!
//! Blob references are five `/`-separated fields, parsed from the right so the
//! root may itself contain slashes:
//!
//! ```text
//! {root}/{file id}/{version id or 0}/{width or 0}/{file name}
//! ```
//!
//! A version of `0` means "current version"; a width of `0` means the
//! unresized original.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("path escapes the upload directory: {0}")]
    Traversal(String),
    #[error("empty image path")]
    Empty,
    #[error("malformed blob reference: {0}")]
    MalformedBlobRef(String),
}

/// Normalize a relative upload path.
///
/// Backslashes become slashes, leading `/` and `./` segments are dropped,
/// and empty or `.` segments are collapsed. Any `..` segment is rejected.
pub fn normalize_relative_path(path: &str) -> Result<String, NamingError> {
    let unified = path.replace('\\', "/");
    let mut parts = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(NamingError::Traversal(path.to_string())),
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(NamingError::Empty);
    }
    Ok(parts.join("/"))
}

/// Split a file name into stem and extension. A leading dot is part of the
/// stem, so `.hidden` has no extension; a trailing dot is an empty one.
fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], Some(&file_name[pos + 1..])),
        _ => (file_name, None),
    }
}

/// Lowercased extension of the last path segment, if it has a non-empty one.
pub fn extension_of(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    split_extension(file_name)
        .1
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Relative path of the derivative of `original` at `width`.
///
/// The original path must already be normalized.
pub fn derivative_path(resized_subdir: &str, original: &str, width: u32) -> String {
    let (dir, file_name) = match original.rfind('/') {
        Some(pos) => (&original[..=pos], &original[pos + 1..]),
        None => ("", original),
    };
    let suffixed = match split_extension(file_name) {
        (stem, Some(ext)) => format!("{stem}-{width}px.{ext}"),
        (stem, None) => format!("{stem}-{width}px"),
    };
    let subdir = resized_subdir.trim_matches('/');
    format!("{subdir}/{dir}{suffixed}")
}

/// Decomposed blob reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub root: String,
    pub file_id: i64,
    /// `None` for the current version.
    pub file_version_id: Option<i64>,
    /// `None` for the unresized original.
    pub width: Option<u32>,
    pub file_name: String,
}

impl BlobRef {
    pub fn new(
        root: &str,
        file_id: i64,
        file_version_id: Option<i64>,
        width: Option<u32>,
        file_name: &str,
    ) -> Self {
        // Only the last non-empty path segment of the name is kept.
        let file_name = file_name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        Self {
            root: root.trim_end_matches('/').to_string(),
            file_id,
            file_version_id: file_version_id.filter(|v| *v > 0),
            width: width.filter(|w| *w > 0),
            file_name: file_name.to_string(),
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.root,
            self.file_id,
            self.file_version_id.unwrap_or(0),
            self.width.unwrap_or(0),
            self.file_name
        )
    }
}

/// Build the opaque reference string for a blob.
pub fn build_blob_reference(blob: &BlobRef) -> String {
    blob.to_string()
}

/// Parse a reference produced by [`build_blob_reference`].
pub fn parse_blob_reference(reference: &str) -> Result<BlobRef, NamingError> {
    let malformed = || NamingError::MalformedBlobRef(reference.to_string());
    let mut fields = reference.rsplitn(5, '/');
    let file_name = fields.next().ok_or_else(malformed)?;
    let width: u32 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)?;
    let version: i64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)?;
    let file_id: i64 = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(malformed)?;
    let root = fields.next().ok_or_else(malformed)?;
    if version < 0 {
        return Err(malformed());
    }
    Ok(BlobRef {
        root: root.to_string(),
        file_id,
        file_version_id: (version > 0).then_some(version),
        width: (width > 0).then_some(width),
        file_name: file_name.to_string(),
    })
}
