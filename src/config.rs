//! Project configuration.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table, the user file is merged on top key by key, and
//! the result is deserialized with unknown keys rejected. A project without a
//! config file builds with the stock defaults.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! title = "Gallery"
//! content_root = "content"         # Source images, scanned recursively
//! metadata_file = "gallery.toml"   # Categories, titles, descriptions
//! output_dir = "dist"              # Everything the build writes
//! default_category = "Uncategorized"
//!
//! [thumbnails]
//! max_dimension = 800              # Longest edge of derived renditions
//! modern_quality = 80              # AVIF quality (1-100)
//! fallback_quality = 90            # JPEG quality (1-100)
//! encoder_speed = 6                # rav1e speed (1 = slowest/best, 10 = fastest)
//! placeholder = true               # Inline blurred preview as a data URL
//! placeholder_size = 20            # Longest edge of the preview
//! placeholder_quality = 50         # Starting JPEG quality of the preview
//! placeholder_max_bytes = 1000     # Upper bound on the data URL length
//!
//! [assets]
//! # static_dir = "static"          # Files to fingerprint and publish
//! publish_originals = true
//!
//! [assets.bundles]
//! # "gallery.css" = ["css/base.css", "css/grid.css"]
//!
//! [processing]
//! # max_processes = 4              # Default: all CPU cores
//! timeout_secs = 120               # Per-image processing limit
//! max_decode_mb = 512              # Decoder allocation ceiling per image
//! ```
//!
//! Relative paths resolve against the directory that holds the config file,
//! see [`SiteConfig::resolve_paths`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),
}

/// Project configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Gallery title passed through to the render context.
    pub title: String,
    /// Directory scanned for source images.
    pub content_root: String,
    /// Human-edited metadata store (categories, titles, descriptions).
    pub metadata_file: String,
    /// Directory receiving every generated file.
    pub output_dir: String,
    /// Category assigned to newly discovered images.
    pub default_category: String,
    /// Derived rendition settings.
    pub thumbnails: ThumbnailsConfig,
    /// Static asset fingerprinting settings.
    pub assets: AssetsConfig,
    /// Parallelism and per-image limits.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Gallery".to_string(),
            content_root: "content".to_string(),
            metadata_file: "gallery.toml".to_string(),
            output_dir: "dist".to_string(),
            default_category: "Uncategorized".to_string(),
            thumbnails: ThumbnailsConfig::default(),
            assets: AssetsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thumbnails;
        if t.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_dimension must be non-zero".into(),
            ));
        }
        for (key, value) in [
            ("thumbnails.modern_quality", t.modern_quality),
            ("thumbnails.fallback_quality", t.fallback_quality),
            ("thumbnails.placeholder_quality", t.placeholder_quality),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!("{key} must be 1-100")));
            }
        }
        if !(1..=10).contains(&t.encoder_speed) {
            return Err(ConfigError::Validation(
                "thumbnails.encoder_speed must be 1-10".into(),
            ));
        }
        if !(1..=64).contains(&t.placeholder_size) {
            return Err(ConfigError::Validation(
                "thumbnails.placeholder_size must be 1-64".into(),
            ));
        }
        if t.placeholder_max_bytes == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.placeholder_max_bytes must be non-zero".into(),
            ));
        }
        if self.default_category.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_category must not be empty".into(),
            ));
        }
        for (key, value) in [
            ("content_root", &self.content_root),
            ("metadata_file", &self.metadata_file),
            ("output_dir", &self.output_dir),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.processing.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "processing.timeout_secs must be non-zero".into(),
            ));
        }
        if self.processing.max_decode_mb == 0 {
            return Err(ConfigError::Validation(
                "processing.max_decode_mb must be non-zero".into(),
            ));
        }
        for (name, files) in &self.assets.bundles {
            if name.trim().is_empty() || files.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "assets.bundles.\"{name}\" needs a name and at least one file"
                )));
            }
        }
        Ok(())
    }

    /// Resolve every configured path against `base` (the config file's
    /// directory). Absolute paths are kept as they are.
    pub fn resolve_paths(&self, base: &Path) -> ProjectPaths {
        ProjectPaths {
            content_root: base.join(&self.content_root),
            metadata_file: base.join(&self.metadata_file),
            output_dir: base.join(&self.output_dir),
            static_dir: self.assets.static_dir.as_ref().map(|d| base.join(d)),
        }
    }
}

/// Filesystem locations derived from a [`SiteConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub content_root: PathBuf,
    pub metadata_file: PathBuf,
    pub output_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
}

/// Derived rendition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Longest edge, in pixels, of both renditions. Never upscales.
    pub max_dimension: u32,
    /// AVIF quality for the modern rendition.
    pub modern_quality: u32,
    /// JPEG quality for the fallback rendition.
    pub fallback_quality: u32,
    /// rav1e speed preset.
    pub encoder_speed: u8,
    /// Produce an inline blurred preview for every image.
    pub placeholder: bool,
    /// Longest edge of the preview, in pixels.
    pub placeholder_size: u32,
    /// JPEG quality the preview starts at before it is squeezed to fit.
    pub placeholder_quality: u32,
    /// Longest data URL the preview may produce.
    pub placeholder_max_bytes: usize,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 800,
            modern_quality: 80,
            fallback_quality: 90,
            encoder_speed: 6,
            placeholder: true,
            placeholder_size: 20,
            placeholder_quality: 50,
            placeholder_max_bytes: 1000,
        }
    }
}

/// Static asset settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Directory of stylesheets, scripts and fonts to publish.
    pub static_dir: Option<String>,
    /// Publish fingerprinted copies of the source images.
    pub publish_originals: bool,
    /// Output name → files (relative to `static_dir`) concatenated into it.
    pub bundles: BTreeMap<String, Vec<String>>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            static_dir: None,
            publish_originals: true,
            bundles: BTreeMap::new(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Wall-clock limit for one image before it is reported as failed.
    pub timeout_secs: u64,
    /// Upper bound on decoder allocations for a single image, in MiB.
    pub max_decode_mb: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            timeout_secs: 120,
            max_decode_mb: 512,
        }
    }
}

impl ProcessingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_decode_bytes(&self) -> u64 {
        self.max_decode_mb.saturating_mul(1024 * 1024)
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Load a config file the user named explicitly.
///
/// Same as [`load_config`], except that a missing file is an error rather
/// than a silent fall back to the defaults.
pub fn load_required_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    load_config(path)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# contact-sheet configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.
# Relative paths are resolved against the directory holding this file.

# Gallery title, handed to the templates.
title = "Gallery"

# Directory scanned (recursively) for jpg, jpeg, png, gif and webp files.
content_root = "content"

# Metadata store: category order plus per-image title, description and
# category. New images are appended here automatically; edit freely.
metadata_file = "gallery.toml"

# Everything the build writes goes here, including the build cache.
output_dir = "dist"

# Category given to newly discovered images. Always present, listed last
# unless you place it yourself.
default_category = "Uncategorized"

# ---------------------------------------------------------------------------
# Derived renditions
# ---------------------------------------------------------------------------
# Each image gets an AVIF rendition for modern browsers and a JPEG for
# everything else, both bounded to max_dimension on the longest edge.
# Changing any value here re-encodes every image on the next build.
[thumbnails]
max_dimension = 800
modern_quality = 80
fallback_quality = 90
# rav1e speed: 1 is slowest with the smallest files, 10 is fastest.
encoder_speed = 6
# A tiny blurred JPEG, inlined as a data: URL, for templates to show while
# the real rendition loads. Its quality is lowered in steps of 10 until the
# URL fits in placeholder_max_bytes.
placeholder = true
placeholder_size = 20
placeholder_quality = 50
placeholder_max_bytes = 1000

# ---------------------------------------------------------------------------
# Static assets
# ---------------------------------------------------------------------------
# Files are published with a content hash in their name, e.g.
# css/site.css -> assets/css/site.3f9a1c2b.css.
[assets]
# static_dir = "static"
publish_originals = true

# Bundles concatenate several files from static_dir into one published file.
[assets.bundles]
# "gallery.css" = ["css/base.css", "css/grid.css"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Defaults to the number of CPU cores and is
# clamped to it.
# max_processes = 4

# An image taking longer than this is reported as failed.
timeout_secs = 120

# Decoder memory ceiling per image, in MiB. Larger images fail cleanly.
max_decode_mb = 512
"##
}
