//! Shared types passed between the planner, the stores and the resolver.
//!
//! These are the values a page renderer hands in (an [`ImageReference`] and
//! [`DisplayConstraints`]) and gets back (a [`Resolution`]). They serialize to
//! JSON for the CLI's `--json` output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions. A zero on either axis means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both axes are non-zero.
    pub fn is_known(self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Total pixel count, used to size resample timeouts.
    pub fn pixels(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identifies an uploaded source image.
///
/// Which variant is in use depends on the wiki-wide storage backend:
/// - `File`: path relative to the upload directory (`/en/2010/10/cat.jpg`)
/// - `Blob`: numeric ids of a database row; `file_version_id: None` means
///   "current version"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageReference {
    File {
        path: String,
    },
    Blob {
        file_id: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_version_id: Option<i64>,
    },
}

impl ImageReference {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File { path: path.into() }
    }

    /// Blob reference. A version id of `-1`, `0` or `None` selects the
    /// current version.
    pub fn blob(file_id: i64, file_version_id: Option<i64>) -> Self {
        Self::Blob {
            file_id,
            file_version_id: file_version_id.filter(|v| *v > 0),
        }
    }

    /// Stable string used as the Dimension Cache key and in log lines.
    pub fn cache_key(&self) -> String {
        match self {
            Self::File { path } => format!("file:{path}"),
            Self::Blob {
                file_id,
                file_version_id: Some(v),
            } => format!("blob:{file_id}:{v}"),
            Self::Blob {
                file_id,
                file_version_id: None,
            } => format!("blob:{file_id}:current"),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "{path}"),
            Self::Blob {
                file_id,
                file_version_id: Some(v),
            } => write!(f, "file #{file_id} (version {v})"),
            Self::Blob {
                file_id,
                file_version_id: None,
            } => write!(f, "file #{file_id} (current)"),
        }
    }
}

/// Per-render display constraints. A max of zero or less leaves that axis
/// unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConstraints {
    pub max_width: i32,
    pub max_height: i32,
    pub allow_enlarge: bool,
}

impl DisplayConstraints {
    pub fn new(max_width: i32, max_height: i32) -> Self {
        Self {
            max_width,
            max_height,
            allow_enlarge: true,
        }
    }

    /// No scaling requested; the original size is displayed.
    pub fn unconstrained() -> Self {
        Self::new(0, 0)
    }

    pub fn with_allow_enlarge(mut self, allow_enlarge: bool) -> Self {
        self.allow_enlarge = allow_enlarge;
        self
    }
}

impl Default for DisplayConstraints {
    fn default() -> Self {
        Self::unconstrained()
    }
}

/// One cached derivative: a source image at a quantized width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    pub reference: ImageReference,
    pub width: u32,
}

impl DerivativeKey {
    pub fn new(reference: ImageReference, width: u32) -> Self {
        Self { reference, width }
    }

    /// Key used for single-flight locking.
    pub fn flight_key(&self) -> String {
        format!("{}@{}", self.reference.cache_key(), self.width)
    }
}

/// A derivative (or the original) as it exists in a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    /// Relative file URL or opaque blob reference.
    pub reference: String,
    pub dimensions: Dimensions,
}

/// What the page renderer embeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Reference to the bytes the browser should fetch.
    pub display_ref: String,
    /// Size for the `<img>` tag (from the scale planner).
    pub display: Dimensions,
    /// Size of the bytes behind `display_ref`.
    pub stored: Dimensions,
    /// Size of the uploaded original.
    pub original: Dimensions,
    /// Whether `display_ref` points at a generated derivative.
    pub resized: bool,
}
