//! End-to-end image resolution for page rendering.
//!
//! [`ImageResolver::resolve`] is the single entry point the page renderer
//! needs: given an uploaded image and its display constraints, it returns the
//! reference the browser should fetch and the size of the `<img>` tag.
//!
//! ```text
//! dimension cache ─miss→ probe original
//!        │
//!   plan_scale ──→ quantize ──→ (resized?) ──no──→ original reference
//!                                   │yes
//!                                   ▼
//!                        DerivativeStore::resolve
//! ```
//!
//! [`ImageResolver::render`] wraps `resolve` for callers that must never fail:
//! every error degrades to a link instead of an inline image.

use crate::cache::DimensionCache;
use crate::imaging::{plan_scale, quantize};
use crate::store::{DerivativeStore, StoreError};
use crate::types::{Dimensions, DisplayConstraints, ImageReference, Resolution};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the page should show for an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rendering {
    /// Show the image inline.
    Inline(Resolution),
    /// Link to the uploaded file; it can't be shown as an image.
    FileLink {
        reference: ImageReference,
        reason: String,
    },
    /// The upload is missing; link to the upload form instead.
    UploadLink { reference: ImageReference },
}

pub struct ImageResolver {
    store: Arc<dyn DerivativeStore>,
    cache: Arc<dyn DimensionCache>,
    increment: i32,
}

impl ImageResolver {
    pub fn new(
        store: Arc<dyn DerivativeStore>,
        cache: Arc<dyn DimensionCache>,
        increment: i32,
    ) -> Self {
        Self {
            store,
            cache,
            increment,
        }
    }

    /// Original dimensions, from the cache or by probing the store.
    pub fn original_dimensions(
        &self,
        wiki: &str,
        reference: &ImageReference,
    ) -> Result<Option<Dimensions>, StoreError> {
        if let Some(dims) = self.cache.get(wiki, reference) {
            return Ok(Some(dims));
        }
        let dims = self.store.original_dimensions(reference)?;
        match dims {
            Some(d) => self.cache.put(wiki, reference, d),
            None => info!(%reference, "unknown image dimensions"),
        }
        Ok(dims)
    }

    pub fn resolve(
        &self,
        wiki: &str,
        reference: &ImageReference,
        constraints: &DisplayConstraints,
    ) -> Result<Resolution, StoreError> {
        let original = self
            .original_dimensions(wiki, reference)?
            .ok_or_else(|| StoreError::Decode(format!("{reference} is not a recognized image")))?;

        let planned = plan_scale(original, constraints);
        let quantized = quantize(original, planned, self.increment);
        debug!(
            %reference,
            %original,
            planned = %planned,
            target = %quantized.dimensions,
            "planned"
        );

        if !quantized.resized {
            return Ok(Resolution {
                display_ref: self.store.original_reference(reference)?,
                display: planned,
                stored: original,
                original,
                resized: false,
            });
        }

        let stored = self.store.resolve(reference, quantized.dimensions)?;
        Ok(Resolution {
            display_ref: stored.reference,
            display: planned,
            stored: stored.dimensions,
            original,
            resized: true,
        })
    }

    /// [`resolve`](Self::resolve), degrading every error to a fallback.
    ///
    /// | Error | Rendering |
    /// |---|---|
    /// | `SourceNotFound` | [`Rendering::UploadLink`] |
    /// | `Storage`, `Busy` | inline, unresized original |
    /// | anything else, including `Timeout` | [`Rendering::FileLink`] |
    pub fn render(
        &self,
        wiki: &str,
        reference: &ImageReference,
        constraints: &DisplayConstraints,
    ) -> Rendering {
        match self.resolve(wiki, reference, constraints) {
            Ok(resolution) => Rendering::Inline(resolution),
            Err(StoreError::SourceNotFound(_)) => {
                warn!(%reference, "missing upload, linking to upload page");
                Rendering::UploadLink {
                    reference: reference.clone(),
                }
            }
            Err(e @ (StoreError::Storage(_) | StoreError::Busy(_))) => {
                warn!(%reference, error = %e, "no derivative available, serving original");
                self.unresized(wiki, reference, constraints)
                    .unwrap_or_else(|e| file_link(reference, &e))
            }
            Err(e) => {
                warn!(%reference, error = %e, "image not renderable, linking to file");
                file_link(reference, &e)
            }
        }
    }

    fn unresized(
        &self,
        wiki: &str,
        reference: &ImageReference,
        constraints: &DisplayConstraints,
    ) -> Result<Rendering, StoreError> {
        let original = self
            .original_dimensions(wiki, reference)?
            .ok_or_else(|| StoreError::Decode(format!("{reference} is not a recognized image")))?;
        Ok(Rendering::Inline(Resolution {
            display_ref: self.store.original_reference(reference)?,
            display: plan_scale(original, constraints),
            stored: original,
            original,
            resized: false,
        }))
    }

    /// Drop all cached dimensions.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn file_link(reference: &ImageReference, error: &StoreError) -> Rendering {
    Rendering::FileLink {
        reference: reference.clone(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStats, MemoryDimensionCache};
    use crate::imaging::backend::tests::MockBackend;
    use crate::store::FilesystemStore;
    use crate::store::tests::mock_generator;
    use crate::test_helpers::write_image;
    use crate::types::StoredImage;
    use image::ImageFormat;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        backend: Arc<MockBackend>,
        cache: Arc<MemoryDimensionCache>,
        resolver: ImageResolver,
    }

    fn fixture(increment: i32) -> Fixture {
        fixture_with(Arc::new(MockBackend::new()), increment)
    }

    fn fixture_with(backend: Arc<MockBackend>, increment: i32) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemStore::new(tmp.path(), "resized", mock_generator(backend.clone()));
        let cache = Arc::new(MemoryDimensionCache::new());
        let resolver = ImageResolver::new(Arc::new(store), cache.clone(), increment);
        Fixture {
            tmp,
            backend,
            cache,
            resolver,
        }
    }

    /// Store whose originals are fine but whose derivatives always fail.
    struct FailingStore(StoreError);

    impl DerivativeStore for FailingStore {
        fn original_dimensions(
            &self,
            _reference: &ImageReference,
        ) -> Result<Option<Dimensions>, StoreError> {
            Ok(Some(Dimensions::new(800, 400)))
        }

        fn original_reference(&self, _reference: &ImageReference) -> Result<String, StoreError> {
            Ok("en/cat.jpg".into())
        }

        fn resolve(
            &self,
            _reference: &ImageReference,
            _target: Dimensions,
        ) -> Result<StoredImage, StoreError> {
            Err(self.0.clone())
        }
    }

    #[test]
    fn resolves_quantized_derivative() {
        let f = fixture(400);
        write_image(&f.tmp.path().join("en/cat.jpg"), 800, 400, ImageFormat::Jpeg);
        let cat = ImageReference::file("/en/cat.jpg");

        let r = f
            .resolver
            .resolve("en", &cat, &DisplayConstraints::new(200, 200))
            .unwrap();
        assert_eq!(r.display, Dimensions::new(200, 100));
        assert_eq!(r.stored, Dimensions::new(400, 200));
        assert_eq!(r.original, Dimensions::new(800, 400));
        assert_eq!(r.display_ref, "resized/en/cat-400px.jpg");
        assert!(r.resized);
    }

    #[test]
    fn second_resolve_uses_caches() {
        let f = fixture(400);
        write_image(&f.tmp.path().join("en/cat.jpg"), 800, 400, ImageFormat::Jpeg);
        let cat = ImageReference::file("/en/cat.jpg");
        let c = DisplayConstraints::new(200, 200);

        let first = f.resolver.resolve("en", &cat, &c).unwrap();
        let second = f.resolver.resolve("en", &cat, &c).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.backend.resample_count(), 1);
        assert_eq!(f.cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn quantized_at_original_width_serves_original() {
        let f = fixture(400);
        write_image(&f.tmp.path().join("a.png"), 800, 400, ImageFormat::Png);
        let r = f
            .resolver
            .resolve("en", &ImageReference::file("a.png"), &DisplayConstraints::new(500, 0))
            .unwrap();
        assert!(!r.resized);
        assert_eq!(r.display_ref, "a.png");
        assert_eq!(r.display, Dimensions::new(500, 250));
        assert_eq!(r.stored, Dimensions::new(800, 400));
        assert_eq!(f.backend.resample_count(), 0);
    }

    #[test]
    fn zero_increment_serves_original_scaled_by_browser() {
        let f = fixture(0);
        write_image(&f.tmp.path().join("a.png"), 400, 200, ImageFormat::Png);
        let r = f
            .resolver
            .resolve("en", &ImageReference::file("a.png"), &DisplayConstraints::new(200, 0))
            .unwrap();
        assert!(!r.resized);
        assert_eq!(r.display_ref, "a.png");
        assert_eq!(r.display, Dimensions::new(200, 100));
        assert_eq!(r.stored, Dimensions::new(400, 200));
        assert_eq!(f.backend.resample_count(), 0);
        assert!(!f.tmp.path().join("resized").exists());
    }

    #[test]
    fn no_enlarge_keeps_original_size() {
        let f = fixture(100);
        write_image(&f.tmp.path().join("small.png"), 150, 150, ImageFormat::Png);
        let c = DisplayConstraints::new(300, 0).with_allow_enlarge(false);
        let r = f
            .resolver
            .resolve("en", &ImageReference::file("small.png"), &c)
            .unwrap();
        assert_eq!(r.display, Dimensions::new(150, 150));
        assert!(!r.resized);
    }

    #[test]
    fn unconstrained_serves_original() {
        let f = fixture(100);
        write_image(&f.tmp.path().join("a.png"), 640, 480, ImageFormat::Png);
        let r = f
            .resolver
            .resolve("en", &ImageReference::file("a.png"), &DisplayConstraints::default())
            .unwrap();
        assert_eq!(r.display, Dimensions::new(640, 480));
        assert_eq!(r.display_ref, "a.png");
    }

    #[test]
    fn missing_upload_renders_upload_link() {
        let f = fixture(100);
        let gone = ImageReference::file("gone.png");
        assert_eq!(
            f.resolver
                .render("en", &gone, &DisplayConstraints::new(100, 100)),
            Rendering::UploadLink { reference: gone }
        );
    }

    #[test]
    fn non_image_renders_file_link() {
        let f = fixture(100);
        std::fs::write(f.tmp.path().join("doc.pdf"), b"%PDF-1.4").unwrap();
        let rendering =
            f.resolver
                .render("en", &ImageReference::file("doc.pdf"), &DisplayConstraints::new(100, 0));
        assert!(matches!(rendering, Rendering::FileLink { .. }));
        assert!(f.cache.is_empty());
    }

    #[test]
    fn decode_failure_renders_file_link() {
        let f = fixture_with(Arc::new(MockBackend::failing("corrupt raster")), 100);
        write_image(&f.tmp.path().join("broken.png"), 400, 400, ImageFormat::Png);
        let rendering = f.resolver.render(
            "en",
            &ImageReference::file("broken.png"),
            &DisplayConstraints::new(100, 0),
        );
        let Rendering::FileLink { reason, .. } = rendering else {
            panic!("expected file link, got {rendering:?}");
        };
        assert!(reason.contains("corrupt raster"));
        assert!(!f.tmp.path().join("resized/broken-100px.png").exists());
    }

    fn render_with_failure(error: StoreError) -> Rendering {
        let resolver = ImageResolver::new(
            Arc::new(FailingStore(error)),
            Arc::new(MemoryDimensionCache::new()),
            100,
        );
        resolver.render(
            "en",
            &ImageReference::file("en/cat.jpg"),
            &DisplayConstraints::new(200, 0),
        )
    }

    #[test]
    fn storage_failure_serves_original_inline() {
        let rendering = render_with_failure(StoreError::Storage("disk full".into()));
        let Rendering::Inline(r) = rendering else {
            panic!("expected inline rendering, got {rendering:?}");
        };
        assert_eq!(r.display_ref, "en/cat.jpg");
        assert_eq!(r.display, Dimensions::new(200, 100));
        assert!(!r.resized);
    }

    #[test]
    fn busy_workers_serve_original_inline() {
        let rendering = render_with_failure(StoreError::Busy("64 resample jobs pending".into()));
        let Rendering::Inline(r) = rendering else {
            panic!("expected inline rendering, got {rendering:?}");
        };
        assert_eq!(r.display_ref, "en/cat.jpg");
        assert!(!r.resized);
    }

    #[test]
    fn timeout_renders_file_link() {
        let rendering = render_with_failure(StoreError::Timeout(Duration::from_secs(2)));
        let Rendering::FileLink { reason, .. } = rendering else {
            panic!("expected file link, got {rendering:?}");
        };
        assert!(reason.contains("timed out"));
    }

    #[test]
    fn traversal_renders_file_link() {
        let f = fixture(100);
        let rendering = f.resolver.render(
            "en",
            &ImageReference::file("../secret.png"),
            &DisplayConstraints::new(100, 0),
        );
        assert!(matches!(rendering, Rendering::FileLink { .. }));
    }

    #[test]
    fn cache_is_per_wiki() {
        let f = fixture(100);
        write_image(&f.tmp.path().join("a.png"), 300, 300, ImageFormat::Png);
        let a = ImageReference::file("a.png");
        let c = DisplayConstraints::default();
        f.resolver.resolve("en", &a, &c).unwrap();
        f.resolver.resolve("de", &a, &c).unwrap();
        assert_eq!(f.cache.stats().misses, 2);
    }

    #[test]
    fn clear_cache_forces_reprobe() {
        let f = fixture(100);
        write_image(&f.tmp.path().join("a.png"), 300, 300, ImageFormat::Png);
        let a = ImageReference::file("a.png");
        let c = DisplayConstraints::default();
        f.resolver.resolve("en", &a, &c).unwrap();
        f.resolver.clear_cache();
        f.resolver.resolve("en", &a, &c).unwrap();
        assert_eq!(f.cache.stats(), CacheStats { hits: 0, misses: 2 });
    }

    #[test]
    fn rendering_serializes_tagged() {
        let json = serde_json::to_value(Rendering::UploadLink {
            reference: ImageReference::file("a.png"),
        })
        .unwrap();
        assert_eq!(json["kind"], "upload_link");
        assert_eq!(json["reference"]["path"], "a.png");
    }
}
