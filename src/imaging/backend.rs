//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: a cheap header probe (`identify`) and a full decode → resize →
//! encode pass (`render`) that yields encoded bytes in memory. Writing those
//! bytes to disk (atomically, under a content-derived name) is left to the
//! caller so the backend never touches the output tree.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and statically
//! linked.

use super::params::{OutputFormat, RenderParams};
use crate::types::SourceFormat;
use image::metadata::Orientation;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Header-level facts about a source file, read without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Stored pixel dimensions, before orientation is applied.
    pub dimensions: Dimensions,
    /// Container format sniffed from the file contents, if recognised.
    pub format: Option<SourceFormat>,
    pub orientation: Orientation,
}

/// One encoded rendition, still in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Everything one render pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendered {
    /// In the same order as the requested encodings.
    pub encodings: Vec<Encoded>,
    /// Inline preview data URL, if one was requested and could be made.
    pub placeholder: Option<String>,
}

/// Trait for image processing backends.
///
/// `Send + Sync` because a backend is shared by every rayon worker and by the
/// watchdog threads that enforce per-image timeouts.
pub trait ImageBackend: Send + Sync {
    /// Read dimensions, format and orientation from the file header.
    fn identify(&self, path: &Path) -> Result<Probe, BackendError>;

    /// Decode, orient, resize and encode once per requested format, plus
    /// the placeholder when `params.placeholder` asks for one.
    fn render(&self, params: &RenderParams) -> Result<Rendered, BackendError>;
}
