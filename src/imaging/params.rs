//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides which renditions an image gets) and the
//! [`backend`](super::backend) (which does the pixel work). This separation
//! allows swapping backends (e.g. for testing with a mock) without changing
//! operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`OutputFormat`]: the encodings a rendition can be written in.
//! - [`EncodeSpec`]: one requested encoding (format + quality + speed).
//! - [`PlaceholderSpec`]: the inline preview (size + starting quality + byte budget).
//! - [`RenderParams`]: decode one source, bound it, and encode it one or more ways.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Encoding of a derived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// AV1 still image, the modern rendition.
    Avif,
    /// Baseline JPEG, the universally supported fallback.
    Jpeg,
    /// Animated sources copied through untouched.
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Avif => "avif",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            OutputFormat::Avif => "image/avif",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
        }
    }
}

/// One encoding of the decoded, resized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSpec {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Encoder effort; only meaningful for AVIF (rav1e speed 1–10).
    pub speed: u8,
}

/// A tiny preview encoded as a `data:image/jpeg;base64,` URL.
///
/// Quality starts at `quality` and drops in steps of 10 (never below 10)
/// until the URL is at most `max_bytes` long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderSpec {
    /// Longest edge in pixels; aspect ratio is kept.
    pub size: u32,
    pub quality: Quality,
    pub max_bytes: usize,
}

/// Decode `source` once, apply its orientation, resize to exactly
/// `width`×`height`, and produce every encoding in `encodings`. The
/// placeholder, when requested, is taken from the full decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub encodings: Vec<EncodeSpec>,
    pub placeholder: Option<PlaceholderSpec>,
    /// Decoder allocation ceiling in bytes.
    pub max_decode_bytes: u64,
}
