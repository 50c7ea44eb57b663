//! End-to-end resolution against real encoders and real storage.
//!
//! These tests go through the public API only: config → `store::open` →
//! `ImageResolver`, with images synthesized on the fly and decoded back to
//! check what actually landed on disk or in the database.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiki_imaging::cache::MemoryDimensionCache;
use wiki_imaging::config::{self, Config, StorageBackend};
use wiki_imaging::imaging;
use wiki_imaging::naming::{self, BlobRef};
use wiki_imaging::resolver::{ImageResolver, Rendering};
use wiki_imaging::store::{self, BlobStore, DerivativeGenerator};
use wiki_imaging::types::{Dimensions, DisplayConstraints, ImageReference};

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn upload(root: &Path, relative: &str, width: u32, height: u32, format: ImageFormat) {
    let path = root.join("uploads").join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, encode(width, height, format)).unwrap();
}

fn config_with_increment(increment: i32) -> Config {
    let mut config = Config::default();
    config.resize.increment = increment;
    config.processing.max_processes = Some(2);
    config
}

fn filesystem_resolver(root: &Path, increment: i32) -> ImageResolver {
    let config = config_with_increment(increment);
    let store = store::open(&config, root).unwrap();
    ImageResolver::new(store, Arc::new(MemoryDimensionCache::new()), increment)
}

// =========================================================================
// Filesystem backend
// =========================================================================

#[test]
fn filesystem_derivative_is_written_and_reused() {
    let tmp = TempDir::new().unwrap();
    upload(tmp.path(), "en/cat.jpg", 800, 400, ImageFormat::Jpeg);
    let resolver = filesystem_resolver(tmp.path(), 400);
    let cat = ImageReference::file("en/cat.jpg");
    let constraints = DisplayConstraints::new(200, 0);

    let first = resolver.resolve("en", &cat, &constraints).unwrap();
    assert_eq!(first.display, Dimensions::new(200, 100));
    assert_eq!(first.stored, Dimensions::new(400, 200));
    assert_eq!(first.original, Dimensions::new(800, 400));
    assert!(first.resized);
    assert_eq!(first.display_ref, "resized/en/cat-400px.jpg");

    let derivative = tmp.path().join("uploads").join(&first.display_ref);
    assert_eq!(
        imaging::probe_file(&derivative).unwrap(),
        Some(Dimensions::new(400, 200))
    );

    // Swap in a marker so a regeneration would be visible.
    let marker = encode(400, 200, ImageFormat::Png);
    std::fs::write(&derivative, &marker).unwrap();

    let second = resolver.resolve("en", &cat, &constraints).unwrap();
    assert_eq!(second, first);
    assert_eq!(std::fs::read(&derivative).unwrap(), marker);
}

#[test]
fn nearby_widths_share_one_derivative() {
    let tmp = TempDir::new().unwrap();
    upload(tmp.path(), "en/wide.png", 1000, 500, ImageFormat::Png);
    let resolver = filesystem_resolver(tmp.path(), 100);
    let wide = ImageReference::file("en/wide.png");

    let a = resolver
        .resolve("en", &wide, &DisplayConstraints::new(237, 0))
        .unwrap();
    let b = resolver
        .resolve("en", &wide, &DisplayConstraints::new(261, 0))
        .unwrap();
    assert_eq!(a.display_ref, "resized/en/wide-300px.png");
    assert_eq!(a.display_ref, b.display_ref);
    assert_eq!(a.display.width, 237);
    assert_eq!(b.display.width, 261);

    let resized_dir = tmp.path().join("uploads/resized/en");
    assert_eq!(std::fs::read_dir(resized_dir).unwrap().count(), 1);
}

#[test]
fn no_enlarge_serves_original() {
    let tmp = TempDir::new().unwrap();
    upload(tmp.path(), "en/small.png", 100, 50, ImageFormat::Png);
    let resolver = filesystem_resolver(tmp.path(), 100);
    let small = ImageReference::file("en/small.png");

    let resolution = resolver
        .resolve(
            "en",
            &small,
            &DisplayConstraints::new(400, 0).with_allow_enlarge(false),
        )
        .unwrap();
    assert_eq!(resolution.display, Dimensions::new(100, 50));
    assert!(!resolution.resized);
    assert_eq!(resolution.display_ref, "en/small.png");
    assert!(!tmp.path().join("uploads/resized").exists());
}

#[test]
fn missing_upload_renders_upload_link() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("uploads")).unwrap();
    let resolver = filesystem_resolver(tmp.path(), 100);
    let ghost = ImageReference::file("en/ghost.jpg");

    let rendering = resolver.render("en", &ghost, &DisplayConstraints::new(200, 0));
    assert_eq!(rendering, Rendering::UploadLink { reference: ghost });
}

#[test]
fn non_image_renders_file_link() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("uploads/en/notes.jpg");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, b"definitely not a jpeg").unwrap();
    let resolver = filesystem_resolver(tmp.path(), 100);

    let rendering = resolver.render(
        "en",
        &ImageReference::file("en/notes.jpg"),
        &DisplayConstraints::new(200, 0),
    );
    assert!(matches!(rendering, Rendering::FileLink { .. }));
}

// =========================================================================
// Database backend
// =========================================================================

#[test]
fn database_derivative_is_stored_as_row() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_with_increment(400);
    config.storage.backend = StorageBackend::Database;
    config.storage.url_root = "/files".into();

    let blobs = Arc::new(
        BlobStore::open(
            &tmp.path().join(&config.storage.database),
            &config.storage.url_root,
            DerivativeGenerator::from_config(&config).unwrap(),
        )
        .unwrap(),
    );
    let version = blobs
        .insert_original(12, "cat.jpg", "image/jpg", &encode(800, 400, ImageFormat::Jpeg))
        .unwrap();

    let resolver = ImageResolver::new(
        blobs.clone(),
        Arc::new(MemoryDimensionCache::new()),
        config.resize.increment,
    );
    let resolution = resolver
        .resolve(
            "en",
            &ImageReference::blob(12, None),
            &DisplayConstraints::new(200, 0),
        )
        .unwrap();
    assert_eq!(resolution.display_ref, "/files/12/0/400/cat.jpg");
    assert_eq!(resolution.stored, Dimensions::new(400, 200));

    let data = blobs
        .read_reference(&resolution.display_ref)
        .unwrap()
        .unwrap();
    assert_eq!(data.mime_type, "image/jpeg");
    assert_eq!(
        imaging::probe_bytes(&data.bytes),
        Some(Dimensions::new(400, 200))
    );
    assert_eq!(blobs.row_count(version).unwrap(), 2);
}

#[test]
fn database_store_opens_from_config() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_with_increment(100);
    config.storage.backend = StorageBackend::Database;

    let store = store::open(&config, tmp.path()).unwrap();
    assert!(tmp.path().join("wiki-files.db").exists());

    let resolver = ImageResolver::new(store, Arc::new(MemoryDimensionCache::new()), 100);
    let rendering = resolver.render(
        "en",
        &ImageReference::blob(99, None),
        &DisplayConstraints::new(100, 0),
    );
    assert!(matches!(rendering, Rendering::UploadLink { .. }));
}

#[test]
fn blob_reference_round_trip() {
    let blob = BlobRef::new("/files", 7, Some(3), Some(250), "Sunset.png");
    let reference = naming::build_blob_reference(&blob);
    assert_eq!(reference, "/files/7/3/250/Sunset.png");
    assert_eq!(naming::parse_blob_reference(&reference).unwrap(), blob);
}

// =========================================================================
// Configuration
// =========================================================================

#[test]
fn config_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("wiki-imaging.toml");
    std::fs::write(
        &path,
        "[storage]\nbackend = \"database\"\n\n[resize]\nincrement = 50\n",
    )
    .unwrap();

    let config = config::load_config(&path).unwrap();
    assert_eq!(config.storage.backend, StorageBackend::Database);
    assert_eq!(config.resize.increment, 50);
    assert_eq!(config.resize.quality, 90);
    assert_eq!(config.storage.resized_subdir, "resized");
}

#[test]
fn config_unknown_key_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("wiki-imaging.toml");
    std::fs::write(&path, "[resize]\nincrment = 50\n").unwrap();
    assert!(config::load_config(&path).is_err());
}

#[test]
fn stock_config_loads_cleanly() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("wiki-imaging.toml");
    std::fs::write(&path, config::stock_config_toml()).unwrap();
    let config = config::load_config(&path).unwrap();
    assert_eq!(config.resize.increment, 100);
}
