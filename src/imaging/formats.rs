//! Format registry.
//!
//! Maps MIME types and file extensions to an [`ImageFormat`] and records what
//! this build can do with it. Lookups normalize their input once, so callers
//! never slice MIME strings or extensions themselves.
//!
//! | Format | Decode | Encode |
//! |---|---|---|
//! | JPEG, PNG, GIF, TIFF, WebP | `image` crate | `image` crate |
//! | AVIF | headers only (`avif-parse`) | no |
//!
//! AVIF is recognized so that uploads are classified as images and their
//! dimensions are known, but derivatives of AVIF sources cannot be produced
//! and fall back to the original.

use image::ImageFormat;
use std::sync::LazyLock;

/// One registered format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInfo {
    pub format: ImageFormat,
    /// Canonical MIME type.
    pub mime: &'static str,
    /// Accepted extensions, canonical first.
    pub extensions: &'static [&'static str],
    pub decode: bool,
    pub encode: bool,
}

impl FormatInfo {
    /// The format can be both decoded and re-encoded, so derivatives are possible.
    pub fn can_resample(&self) -> bool {
        self.decode && self.encode
    }
}

const CANDIDATES: &[(ImageFormat, &str, &[&str])] = &[
    (ImageFormat::Jpeg, "image/jpeg", &["jpg", "jpeg", "jpe"]),
    (ImageFormat::Png, "image/png", &["png"]),
    (ImageFormat::Gif, "image/gif", &["gif"]),
    (ImageFormat::Tiff, "image/tiff", &["tif", "tiff"]),
    (ImageFormat::WebP, "image/webp", &["webp"]),
    (ImageFormat::Avif, "image/avif", &["avif"]),
];

/// Non-standard MIME types seen in the wild.
const MIME_ALIASES: &[(&str, &str)] = &[
    ("image/jpg", "image/jpeg"),
    ("image/pjpeg", "image/jpeg"),
    ("image/x-png", "image/png"),
    ("image/x-tiff", "image/tiff"),
];

static REGISTRY: LazyLock<Vec<FormatInfo>> = LazyLock::new(|| {
    CANDIDATES
        .iter()
        .map(|&(format, mime, extensions)| {
            // AVIF pixel decoding isn't compiled in; its headers are read by avif-parse.
            let decode = format != ImageFormat::Avif && format.reading_enabled();
            let encode = format != ImageFormat::Avif && format.writing_enabled();
            FormatInfo {
                format,
                mime,
                extensions,
                decode,
                encode,
            }
        })
        .collect()
});

/// All registered formats.
pub fn registry() -> &'static [FormatInfo] {
    &REGISTRY
}

/// Lowercase, strip parameters (`; charset=...`) and resolve aliases.
pub fn normalize_mime(mime: &str) -> String {
    let base = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    MIME_ALIASES
        .iter()
        .find(|(alias, _)| *alias == base)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(base)
}

pub fn from_mime(mime: &str) -> Option<&'static FormatInfo> {
    let normalized = normalize_mime(mime);
    REGISTRY.iter().find(|info| info.mime == normalized)
}

pub fn from_extension(ext: &str) -> Option<&'static FormatInfo> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    REGISTRY
        .iter()
        .find(|info| info.extensions.contains(&ext.as_str()))
}

pub fn from_image_format(format: ImageFormat) -> Option<&'static FormatInfo> {
    REGISTRY.iter().find(|info| info.format == format)
}
