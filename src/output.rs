//! CLI output formatting.
//!
//! # Output Format
//!
//! Every command prints the subject on the first line and indented detail
//! lines below it.
//!
//! ## Probe
//!
//! ```text
//! en/cat.jpg
//!     Image: 800x400 (image/jpeg)
//!     Derivatives: supported
//! ```
//!
//! ## Resolve
//!
//! ```text
//! en/cat.jpg
//!     Display: 200x100
//!     Source: resized/en/cat-400px.jpg (400x200)
//!     Original: 800x400
//! ```
//!
//! When the image can't be shown inline the detail is the fallback:
//!
//! ```text
//! file #12 (current)
//!     Missing upload → link to upload page
//! ```
//!
//! ## Parse-ref
//!
//! ```text
//! /files/12/0/400/Cat.jpg
//!     File: 12
//!     Version: current
//!     Width: 400px
//!     Name: Cat.jpg
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure and do no I/O.

use crate::cache::CacheStats;
use crate::imaging::FormatInfo;
use crate::naming::BlobRef;
use crate::resolver::Rendering;
use crate::types::{Dimensions, ImageReference};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn detail(line: impl AsRef<str>) -> String {
    format!("{}{}", indent(1), line.as_ref())
}

// ============================================================================
// Probe
// ============================================================================

pub fn format_probe(
    subject: &str,
    dimensions: Option<Dimensions>,
    format: Option<&FormatInfo>,
) -> Vec<String> {
    let mut lines = vec![subject.to_string()];
    match dimensions {
        Some(dims) => {
            let mime = format.map(|f| f.mime).unwrap_or("unknown format");
            lines.push(detail(format!("Image: {dims} ({mime})")));
            let supported = format.is_some_and(FormatInfo::can_resample);
            lines.push(detail(if supported {
                "Derivatives: supported"
            } else {
                "Derivatives: not supported (served at original size)"
            }));
        }
        None => lines.push(detail("Not an image")),
    }
    lines
}

pub fn print_probe(subject: &str, dimensions: Option<Dimensions>, format: Option<&FormatInfo>) {
    for line in format_probe(subject, dimensions, format) {
        println!("{line}");
    }
}

// ============================================================================
// Resolve
// ============================================================================

pub fn format_rendering(reference: &ImageReference, rendering: &Rendering) -> Vec<String> {
    let mut lines = vec![reference.to_string()];
    match rendering {
        Rendering::Inline(r) => {
            lines.push(detail(format!("Display: {}", r.display)));
            if r.resized {
                lines.push(detail(format!("Source: {} ({})", r.display_ref, r.stored)));
                lines.push(detail(format!("Original: {}", r.original)));
            } else {
                lines.push(detail(format!(
                    "Source: {} (original, {})",
                    r.display_ref, r.original
                )));
            }
        }
        Rendering::FileLink { reason, .. } => {
            lines.push(detail("Not displayable → link to file"));
            lines.push(detail(format!("Reason: {reason}")));
        }
        Rendering::UploadLink { .. } => {
            lines.push(detail("Missing upload → link to upload page"));
        }
    }
    lines
}

pub fn print_rendering(reference: &ImageReference, rendering: &Rendering) {
    for line in format_rendering(reference, rendering) {
        println!("{line}");
    }
}

// ============================================================================
// Blob references and imports
// ============================================================================

pub fn format_blob_ref(reference: &str, blob: &BlobRef) -> Vec<String> {
    let version = match blob.file_version_id {
        Some(v) => v.to_string(),
        None => "current".to_string(),
    };
    let width = match blob.width {
        Some(w) => format!("{w}px"),
        None => "original".to_string(),
    };
    let mut lines = vec![
        reference.to_string(),
        detail(format!("File: {}", blob.file_id)),
        detail(format!("Version: {version}")),
        detail(format!("Width: {width}")),
        detail(format!("Name: {}", blob.file_name)),
    ];
    if !blob.root.is_empty() {
        lines.push(detail(format!("Root: {}", blob.root)));
    }
    lines
}

pub fn print_blob_ref(reference: &str, blob: &BlobRef) {
    for line in format_blob_ref(reference, blob) {
        println!("{line}");
    }
}

pub fn format_import(
    filename: &str,
    file_id: i64,
    file_version_id: i64,
    dimensions: Option<Dimensions>,
) -> Vec<String> {
    let kind = match dimensions {
        Some(dims) => format!("image {dims}"),
        None => "not an image".to_string(),
    };
    vec![
        format!("Imported {filename} as file {file_id}, version {file_version_id}"),
        detail(kind),
    ]
}

pub fn print_import(
    filename: &str,
    file_id: i64,
    file_version_id: i64,
    dimensions: Option<Dimensions>,
) {
    for line in format_import(filename, file_id, file_version_id, dimensions) {
        println!("{line}");
    }
}

pub fn format_cache_stats(stats: &CacheStats) -> String {
    format!("Dimensions: {stats}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::formats;
    use crate::types::Resolution;

    fn cat() -> ImageReference {
        ImageReference::file("en/cat.jpg")
    }

    // =========================================================================
    // format_probe
    // =========================================================================

    #[test]
    fn probe_image_lines() {
        let lines = format_probe(
            "cat.jpg",
            Some(Dimensions::new(800, 400)),
            formats::from_extension("jpg"),
        );
        assert_eq!(
            lines,
            vec![
                "cat.jpg",
                "    Image: 800x400 (image/jpeg)",
                "    Derivatives: supported",
            ]
        );
    }

    #[test]
    fn probe_avif_is_not_resampleable() {
        let lines = format_probe(
            "a.avif",
            Some(Dimensions::new(10, 10)),
            formats::from_extension("avif"),
        );
        assert!(lines[2].contains("not supported"));
    }

    #[test]
    fn probe_non_image() {
        assert_eq!(
            format_probe("notes.txt", None, None),
            vec!["notes.txt", "    Not an image"]
        );
    }

    // =========================================================================
    // format_rendering
    // =========================================================================

    #[test]
    fn rendering_resized() {
        let rendering = Rendering::Inline(Resolution {
            display_ref: "resized/en/cat-400px.jpg".into(),
            display: Dimensions::new(200, 100),
            stored: Dimensions::new(400, 200),
            original: Dimensions::new(800, 400),
            resized: true,
        });
        assert_eq!(
            format_rendering(&cat(), &rendering),
            vec![
                "en/cat.jpg",
                "    Display: 200x100",
                "    Source: resized/en/cat-400px.jpg (400x200)",
                "    Original: 800x400",
            ]
        );
    }

    #[test]
    fn rendering_original() {
        let rendering = Rendering::Inline(Resolution {
            display_ref: "en/cat.jpg".into(),
            display: Dimensions::new(150, 150),
            stored: Dimensions::new(150, 150),
            original: Dimensions::new(150, 150),
            resized: false,
        });
        let lines = format_rendering(&cat(), &rendering);
        assert_eq!(lines[2], "    Source: en/cat.jpg (original, 150x150)");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn rendering_fallbacks() {
        let upload = format_rendering(
            &cat(),
            &Rendering::UploadLink { reference: cat() },
        );
        assert_eq!(upload[1], "    Missing upload → link to upload page");

        let file = format_rendering(
            &cat(),
            &Rendering::FileLink {
                reference: cat(),
                reason: "cannot decode image: bad".into(),
            },
        );
        assert_eq!(file[2], "    Reason: cannot decode image: bad");
    }

    // =========================================================================
    // format_blob_ref / format_import
    // =========================================================================

    #[test]
    fn blob_ref_lines() {
        let blob = BlobRef::new("", 12, None, Some(400), "Cat.jpg");
        assert_eq!(
            format_blob_ref("/12/0/400/Cat.jpg", &blob),
            vec![
                "/12/0/400/Cat.jpg",
                "    File: 12",
                "    Version: current",
                "    Width: 400px",
                "    Name: Cat.jpg",
            ]
        );
    }

    #[test]
    fn blob_ref_with_root() {
        let blob = BlobRef::new("/files", 1, Some(2), None, "a.png");
        let lines = format_blob_ref("/files/1/2/0/a.png", &blob);
        assert_eq!(lines[2], "    Version: 2");
        assert_eq!(lines[3], "    Width: original");
        assert_eq!(lines[5], "    Root: /files");
    }

    #[test]
    fn import_lines() {
        assert_eq!(
            format_import("cat.jpg", 3, 9, Some(Dimensions::new(4, 2))),
            vec!["Imported cat.jpg as file 3, version 9", "    image 4x2"]
        );
        assert_eq!(format_import("a.pdf", 3, 10, None)[1], "    not an image");
    }

    #[test]
    fn cache_stats_line() {
        let stats = CacheStats { hits: 2, misses: 1 };
        assert_eq!(format_cache_stats(&stats), "Dimensions: 2 cached, 1 probed (3 total)");
    }
}
