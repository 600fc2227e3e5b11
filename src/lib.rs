//! # Contact Sheet
//!
//! A build-time asset pipeline for curated photo galleries. A directory of
//! source images and one hand-edited metadata file go in; a directory of
//! small web renditions, fingerprinted assets and a single ordered render
//! context come out. Templates consume the context; this crate never writes
//! HTML.
//!
//! # Architecture: Five Phases
//!
//! ```text
//! 1. Scan        content/      →  SourceImage list
//! 2. Reconcile   gallery.toml  →  store with stubs for new images
//! 3. Process     sources       →  dist/images/derived/   (AVIF + JPEG per image)
//! 4. Publish     static/       →  dist/assets/, dist/images/originals/
//! 5. Render      all of it     →  dist/render-context.json
//! ```
//!
//! Each phase completes before the next begins. Inside phase 3 images are
//! independent and processed in parallel. Two properties hold for every run:
//!
//! - **Idempotence**: a second build over an unchanged tree encodes nothing,
//!   rewrites nothing and produces byte-identical output.
//! - **Isolation**: one bad image is reported and skipped; the other images
//!   and the rest of the build are unaffected.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Phase 1: walks the content root, probes headers, drops duplicates |
//! | [`metadata`] | The `gallery.toml` store: categories, entries, load/save |
//! | [`reconcile`] | Phase 2: typed diff between store and disk, stub append |
//! | [`process`] | Phase 3: parallel, cached, timeout-bounded rendition generation |
//! | [`cache`] | Versioned build cache index and content hashing |
//! | [`imaging`] | `ImageBackend` trait, pure-Rust backend, sizing math |
//! | [`assets`] | Phase 4: content-hashed names for static files and originals |
//! | [`render`] | Phase 5: the ordered render context |
//! | [`pipeline`] | Runs the phases; the fatal [`BuildError`](pipeline::BuildError) |
//! | [`report`] | Recoverable issues collected into the end-of-build report |
//! | [`config`] | `config.toml` loading, stock defaults, validation |
//! | [`naming`] | Filename → display title and slug |
//! | [`atomic`] | Write-temp-then-rename for every file the build produces |
//! | [`types`] | Source container formats |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Metadata File Is the Source of Order
//!
//! Category order and image order come from `gallery.toml` exactly as the
//! user wrote it. Nothing is sorted. New images are appended at the end under
//! the default category, entries whose files disappear are kept and flagged,
//! and the file is only rewritten when something was appended, so a user's
//! edits and comments survive every build that doesn't need to touch it.
//!
//! ## AVIF With a JPEG Fallback
//!
//! The modern rendition is AVIF for size; the JPEG exists for the browsers
//! and tools that still lack AVIF. Both are encoded in pure Rust through the
//! `image` crate (rav1e for AVIF), so the binary has no system dependencies.
//!
//! ## Content-Addressed Everything
//!
//! Derived files are named by a fingerprint of the source bytes and the
//! generation settings; static assets and originals by a hash of their own
//! bytes. Changing a source or a setting produces a new name, so stale
//! browser caches are never an issue, and an unchanged input maps to the
//! same file, so nothing is rewritten.

pub mod assets;
pub mod atomic;
pub mod cache;
pub mod config;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod reconcile;
pub mod render;
pub mod report;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
