//! # Wiki Imaging
//!
//! Image derivative generation and caching for a wiki engine. Pages ask for an
//! uploaded image at some display size; this crate works out how big it should
//! actually be shown, picks a stored size to serve, and makes sure a resized
//! copy at that size exists.
//!
//! # Resolution Pipeline
//!
//! ```text
//! reference + constraints
//!   → original dimensions   (dimension cache, else probe the store)
//!   → display size          (fit inside the box, no-enlarge clamp)
//!   → stored size           (round width up to the resize increment)
//!   → derivative            (reuse, or resample once and persist)
//! ```
//!
//! Rounding to an increment keeps the number of derivatives per image small:
//! a 237px and a 261px request share the same 300px file.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`resolver`] | Entry point: constraints in, display reference and sizes out, with fallbacks |
//! | [`store`] | Filesystem and SQLite derivative stores, single-flight generation |
//! | [`imaging`] | Probing, format table, progressive resampling on a bounded worker pool |
//! | [`cache`] | Per-wiki original dimension cache |
//! | [`naming`] | Derivative file names and database file references |
//! | [`config`] | `wiki-imaging.toml` loading, stock defaults, validation |
//! | [`types`] | Shared value types (`Dimensions`, `ImageReference`, `Resolution`) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two Storage Layouts, One Trait
//!
//! Uploads live either under a directory tree or as rows in a database. Both
//! implement [`store::DerivativeStore`], so the resolver never knows which one
//! it is talking to. Filesystem derivatives sit next to a mirrored path under
//! the resized directory (`resized/en/cat-400px.jpg`); database derivatives are
//! extra rows keyed by width and addressed by a path-like reference.
//!
//! ## Progressive Halving
//!
//! Large reductions are done as repeated halvings followed by one final pass,
//! which keeps thin lines and text from aliasing away. The step plan is a pure
//! function in [`imaging::halving_steps`].
//!
//! ## Bounded, Timed Resampling
//!
//! Decoding untrusted uploads is expensive and occasionally pathological. All
//! resampling runs on a fixed-size rayon pool that admits a bounded number of
//! jobs. Each job gets a timeout that scales with the source pixel count,
//! counted from when a worker picks it up. A pixel ceiling rejects
//! decompression bombs before any allocation happens.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod resolver;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
