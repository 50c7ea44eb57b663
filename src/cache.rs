//! Dimension cache.
//!
//! Probing an original's headers is cheap but not free, and page renders ask
//! for the same images over and over. This cache memoizes original dimensions
//! per `(wiki, reference)`.
//!
//! # Contract
//!
//! The cache is never the source of truth. A miss means the caller probes the
//! original and writes the result back; concurrent misses for the same key
//! just probe twice and store the same value. [`DimensionCache::clear`] is
//! safe at any time and is the only invalidation: entries are never expired
//! individually.
//!
//! Blob references to the *current* version are cached under the current-version
//! key, so a new upload of the same file keeps reporting the previous version's
//! dimensions until the cache is cleared.
//!
//! The cache is injected into the [`ImageResolver`](crate::resolver::ImageResolver)
//! rather than held in a global, so tests can substitute their own.

use crate::types::{Dimensions, ImageReference};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Memoization of original image dimensions.
pub trait DimensionCache: Send + Sync {
    fn get(&self, wiki: &str, reference: &ImageReference) -> Option<Dimensions>;
    fn put(&self, wiki: &str, reference: &ImageReference, dimensions: Dimensions);
    /// Drop every entry.
    fn clear(&self);
}

/// Summary of cache performance for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} probed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} probed", self.misses)
        }
    }
}

/// In-process [`DimensionCache`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryDimensionCache {
    entries: RwLock<HashMap<(String, String), Dimensions>>,
    hits: AtomicU32,
    misses: AtomicU32,
}

impl MemoryDimensionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(wiki: &str, reference: &ImageReference) -> (String, String) {
        (wiki.to_string(), reference.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters since creation. [`clear`](DimensionCache::clear)
    /// keeps them.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl DimensionCache for MemoryDimensionCache {
    fn get(&self, wiki: &str, reference: &ImageReference) -> Option<Dimensions> {
        // A poisoned lock only means a writer panicked mid-insert; treat as a miss.
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|e| e.get(&Self::key(wiki, reference)).copied());
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, wiki: &str, reference: &ImageReference, dimensions: Dimensions) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(Self::key(wiki, reference), dimensions);
        }
    }

    fn clear(&self) {
        match self.entries.write() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}
