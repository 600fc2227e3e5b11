//! High-level image operations.
//!
//! These functions combine calculations with backend execution: they decide
//! which renditions a source gets, ask the backend for the encoded bytes, and
//! publish each file atomically under a fingerprinted name.
//!
//! ## Output naming
//!
//! ```text
//! images/derived/
//! ├── harbour-at-dusk-3f9a1c2b.avif   # modern rendition
//! ├── harbour-at-dusk-3f9a1c2b.jpg    # fallback rendition
//! ├── spinner-77ab01de.gif            # animated source, copied through
//! └── spinner-77ab01de.jpg            # its first frame as the fallback
//! ```
//!
//! The 8-hex suffix is the head of the image's fingerprint (source content +
//! encoding settings), so a new source or new settings never overwrite files
//! an older build or a deployed page still references.

use super::backend::{BackendError, Encoded, ImageBackend};
use super::calculations::bounded_dimensions;
use super::params::{EncodeSpec, OutputFormat, PlaceholderSpec, Quality, RenderParams};
use crate::atomic::write_atomic;
use crate::cache::hash_bytes;
use crate::naming::sanitize_slug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Number of fingerprint characters embedded in derived file names.
pub const NAME_HASH_LEN: usize = 8;

/// Settings shared by every rendition in a build.
#[derive(Debug, Clone, PartialEq)]
pub struct RenditionConfig {
    pub max_dimension: u32,
    pub modern_quality: Quality,
    pub fallback_quality: Quality,
    pub encoder_speed: u8,
    /// `None` disables the inline preview.
    pub placeholder: Option<PlaceholderSpec>,
    pub max_decode_bytes: u64,
}

impl Default for RenditionConfig {
    fn default() -> Self {
        Self {
            max_dimension: 800,
            modern_quality: Quality::new(80),
            fallback_quality: Quality::new(90),
            encoder_speed: 6,
            placeholder: Some(PlaceholderSpec {
                size: 20,
                quality: Quality::new(50),
                max_bytes: 1000,
            }),
            max_decode_bytes: 512 * 1024 * 1024,
        }
    }
}

/// A derived file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFile {
    /// Path relative to the output directory, `/`-separated.
    pub path: String,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: u64,
    /// SHA-256 of the file contents, used to validate cache hits.
    pub sha256: String,
}

/// The modern/fallback pair produced for one source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPair {
    pub modern: DerivedFile,
    pub fallback: DerivedFile,
    /// Inline `data:` URL preview. Lives in the cache record, not on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl DerivedPair {
    pub fn files(&self) -> [&DerivedFile; 2] {
        [&self.modern, &self.fallback]
    }
}

/// What to produce for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec<'a> {
    pub path: &'a Path,
    /// Dimensions after orientation, i.e. as displayed.
    pub display_dimensions: (u32, u32),
    /// Copy the source as the modern rendition instead of re-encoding it.
    pub passthrough: bool,
}

/// Plan the backend call for a source without executing it.
pub fn plan_render(source: &SourceSpec<'_>, config: &RenditionConfig) -> RenderParams {
    let (width, height) = bounded_dimensions(source.display_dimensions, config.max_dimension);
    let fallback = EncodeSpec {
        format: OutputFormat::Jpeg,
        quality: config.fallback_quality,
        speed: config.encoder_speed,
    };
    let encodings = if source.passthrough {
        vec![fallback]
    } else {
        vec![
            EncodeSpec {
                format: OutputFormat::Avif,
                quality: config.modern_quality,
                speed: config.encoder_speed,
            },
            fallback,
        ]
    };
    RenderParams {
        source: source.path.to_path_buf(),
        width,
        height,
        encodings,
        placeholder: config.placeholder,
        max_decode_bytes: config.max_decode_bytes,
    }
}

/// `<slug-of-stem>-<fingerprint head>.<ext>`
pub fn derived_name(filename: &str, fingerprint: &str, format: OutputFormat) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let slug = match sanitize_slug(&stem) {
        s if s.is_empty() => "image".to_string(),
        s => s,
    };
    let head = &fingerprint[..fingerprint.len().min(NAME_HASH_LEN)];
    format!("{slug}-{head}.{}", format.extension())
}

fn publish(
    output_dir: &Path,
    subdir: &str,
    name: String,
    encoded: Encoded,
) -> Result<DerivedFile> {
    let relative = format!("{subdir}/{name}");
    write_atomic(&output_dir.join(&relative), &encoded.bytes)?;
    Ok(DerivedFile {
        path: relative,
        format: encoded.format,
        width: encoded.width,
        height: encoded.height,
        bytes: encoded.bytes.len() as u64,
        sha256: hash_bytes(&encoded.bytes),
    })
}

/// Produce and write the modern/fallback pair for one source.
///
/// Files land in `output_dir/subdir` under [`derived_name`]s. Both are
/// written atomically; if the second encoding fails the first file may be
/// left behind but no cache record will point at it.
pub fn create_derived_pair(
    backend: &impl ImageBackend,
    source: &SourceSpec<'_>,
    filename: &str,
    fingerprint: &str,
    output_dir: &Path,
    subdir: &str,
    config: &RenditionConfig,
) -> Result<DerivedPair> {
    let params = plan_render(source, config);
    let rendered = backend.render(&params)?;
    let mut encoded = rendered.encodings.into_iter();

    let modern = if source.passthrough {
        let bytes = std::fs::read(source.path)?;
        let (width, height) = source.display_dimensions;
        Encoded {
            format: OutputFormat::Gif,
            bytes,
            width,
            height,
        }
    } else {
        encoded
            .next()
            .ok_or_else(|| BackendError::Encode("backend returned no modern rendition".into()))?
    };
    let fallback = encoded
        .next()
        .ok_or_else(|| BackendError::Encode("backend returned no fallback rendition".into()))?;

    let modern_name = derived_name(filename, fingerprint, modern.format);
    let fallback_name = derived_name(filename, fingerprint, fallback.format);
    Ok(DerivedPair {
        modern: publish(output_dir, subdir, modern_name, modern)?,
        fallback: publish(output_dir, subdir, fallback_name, fallback)?,
        placeholder: rendered.placeholder,
    })
}
