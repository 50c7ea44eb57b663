//! Configuration module.
//!
//! Handles loading and validating `wiki-imaging.toml`. Stock defaults are
//! overridden by whatever the file specifies; the file is sparse and only
//! needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! backend = "filesystem"      # or "database"
//! upload_dir = "uploads"      # root of originals and derivatives
//! resized_subdir = "resized"  # derivative sub-directory under upload_dir
//! database = "wiki-files.db"  # SQLite file for the database backend
//! url_root = ""               # prefix of blob references
//!
//! [resize]
//! increment = 100             # width bucket size in pixels (<= 0 serves originals)
//! allow_enlarge = true        # default when a render doesn't say
//! quality = 90                # JPEG encoding quality (1-100)
//!
//! [processing]
//! max_processes = 4           # resample workers (omit for auto = CPU cores)
//! timeout_base_ms = 2000
//! timeout_per_megapixel_ms = 250
//! max_source_pixels = 100000000
//! max_pending = 64            # resample jobs queued or running at once
//! queue_timeout_ms = 30000    # longest wait for a free worker
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Imaging configuration loaded from `wiki-imaging.toml`.
///
/// All fields have defaults matching a stock wiki install.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where originals live and where derivatives are written.
    pub storage: StorageConfig,
    /// Scaling and quantization settings.
    pub resize: ResizeConfig,
    /// Worker pool and resource limits.
    pub processing: ProcessingConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.resize.quality) {
            return Err(ConfigError::Validation(
                "resize.quality must be 1-100".into(),
            ));
        }
        let subdir = Path::new(&self.storage.resized_subdir);
        if self.storage.resized_subdir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.resized_subdir must not be empty".into(),
            ));
        }
        if subdir.is_absolute()
            || subdir
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            return Err(ConfigError::Validation(
                "storage.resized_subdir must be a relative path without '..'".into(),
            ));
        }
        if self.processing.max_source_pixels == 0 {
            return Err(ConfigError::Validation(
                "processing.max_source_pixels must be non-zero".into(),
            ));
        }
        if self.processing.max_pending == 0 {
            return Err(ConfigError::Validation(
                "processing.max_pending must be at least 1".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which persistence model holds uploaded files. Wiki-wide, never per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Database,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding uploaded originals (filesystem backend).
    pub upload_dir: String,
    /// Sub-directory of `upload_dir` that receives derivatives.
    pub resized_subdir: String,
    /// SQLite database file (database backend).
    pub database: String,
    /// Prefix of blob references handed to the content-serving endpoint.
    pub url_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            upload_dir: "uploads".to_string(),
            resized_subdir: "resized".to_string(),
            database: "wiki-files.db".to_string(),
            url_root: String::new(),
        }
    }
}

/// Scaling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    /// Width bucket in pixels. Zero or negative disables derivatives: the
    /// original is always served and scaled by the browser.
    pub increment: i32,
    /// Default for renders that don't specify whether to upscale.
    pub allow_enlarge: bool,
    /// JPEG quality used when encoding derivatives.
    pub quality: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            increment: 100,
            allow_enlarge: true,
            quality: 90,
        }
    }
}

/// Worker pool and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel resample workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Fixed part of the resample timeout.
    pub timeout_base_ms: u64,
    /// Additional resample time allowed per megapixel of source image.
    pub timeout_per_megapixel_ms: u64,
    /// Sources larger than this are refused by the decoder.
    pub max_source_pixels: u64,
    /// Resample jobs admitted at once, queued or running. A job that timed
    /// out still holds its slot until it actually finishes.
    pub max_pending: usize,
    /// How long a job may wait for a free worker before it is dropped.
    pub queue_timeout_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            timeout_base_ms: 2000,
            timeout_per_megapixel_ms: 250,
            max_source_pixels: 100_000_000,
            max_pending: 64,
            queue_timeout_ms: 30_000,
        }
    }
}

impl ProcessingConfig {
    /// Resample timeout for a source of `pixels` pixels.
    pub fn timeout_for(&self, pixels: u64) -> Duration {
        let per_mp = self.timeout_per_megapixel_ms.saturating_mul(pixels) / 1_000_000;
        Duration::from_millis(self.timeout_base_ms.saturating_add(per_mp))
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
/// contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from `path`, merging user values on top of stock defaults,
/// rejecting unknown keys and validating the result.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(stock_defaults_value()?, overlay),
        None => stock_defaults_value()?,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# wiki-imaging configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Storage
# ---------------------------------------------------------------------------
[storage]
# Where uploads live: "filesystem" (files under upload_dir) or
# "database" (rows in the SQLite file below).
backend = "filesystem"

# Root directory of uploaded originals.
upload_dir = "uploads"

# Derivatives are written to <upload_dir>/<resized_subdir>/<original path>
# with "-<width>px" appended to the file name.
resized_subdir = "resized"

# SQLite database holding file versions and derivative blobs.
database = "wiki-files.db"

# Prefix of blob references: <url_root>/<file id>/<version>/<width>/<name>
url_root = ""

# ---------------------------------------------------------------------------
# Resizing
# ---------------------------------------------------------------------------
[resize]
# Requested widths are rounded up to a multiple of this many pixels so that
# many display sizes share one derivative. 0 or less disables derivatives:
# the original is always served and the browser scales it.
increment = 100

# Whether images may be displayed larger than their original size.
allow_enlarge = true

# JPEG encoding quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel resample workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Resample timeout = timeout_base_ms + timeout_per_megapixel_ms * megapixels.
timeout_base_ms = 2000
timeout_per_megapixel_ms = 250

# Sources with more pixels than this are refused.
max_source_pixels = 100000000

# Resample jobs admitted at once, waiting or running. Further requests are
# served the original until a slot frees up. A timed-out job keeps its slot
# until it really finishes.
max_pending = 64

# Longest wait for a free worker. The resample timeout only starts once a
# worker picks the job up.
queue_timeout_ms = 30000
"##
}
