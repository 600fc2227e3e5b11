//! Asset fingerprinting.
//!
//! Publishes static files (stylesheets, scripts, fonts), named bundles and
//! the original source images under content-hashed names:
//!
//! ```text
//! static/css/app.css       → dist/assets/css/app.1a2b3c4d.css
//! bundle "gallery.js"      → dist/assets/gallery.9f8e7d6c.js
//! content/2021/a.jpg       → dist/images/originals/a.5e6f7a8b.jpg
//! ```
//!
//! The hash is the first 8 hex characters of the file's SHA-256, so the same
//! bytes always get the same name and a changed file always gets a new one.
//! The returned [`AssetManifest`] maps each logical name (the path the
//! templates know) to its published path. A destination that already holds
//! identical bytes is left alone.

use crate::atomic::write_if_changed;
use crate::cache::hash_bytes;
use crate::scan::SourceImage;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Static assets and bundles, relative to the output directory.
pub const ASSETS_SUBDIR: &str = "assets";
/// Published originals, relative to the output directory.
pub const ORIGINALS_SUBDIR: &str = "images/originals";
/// Hex characters of the content hash embedded in names.
pub const HASH_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("static directory {0} does not exist")]
    StaticDirMissing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to publish {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk static directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Logical name → published path (relative to the output directory).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssetManifest {
    files: BTreeMap<String, String>,
}

impl AssetManifest {
    pub fn get(&self, logical: &str) -> Option<&str> {
        self.files.get(logical).map(String::as_str)
    }

    pub fn insert(&mut self, logical: String, published: String) {
        self.files.insert(logical, published);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Everything the fingerprinting phase published.
#[derive(Debug, Default)]
pub struct PublishedAssets {
    /// Static files and bundles.
    pub statics: AssetManifest,
    /// Originals, keyed by source filename.
    pub originals: AssetManifest,
    /// Files actually (re)written this run.
    pub written: usize,
}

/// `dir/stem.<hash>.ext` for a `/`-separated logical name.
pub fn fingerprinted_name(logical: &str, bytes: &[u8]) -> String {
    let hash = hash_bytes(bytes);
    let hash = &hash[..HASH_LEN];
    let (dir, file) = match logical.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, logical),
    };
    let name = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.{hash}.{ext}"),
        _ => format!("{file}.{hash}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{name}"),
        None => name,
    }
}

/// Write `bytes` under its fingerprinted name below `output_dir/subdir`.
/// Returns the published path relative to `output_dir` and whether the file
/// was written.
pub fn publish_bytes(
    output_dir: &Path,
    subdir: &str,
    logical: &str,
    bytes: &[u8],
) -> Result<(String, bool), AssetError> {
    let relative = format!("{subdir}/{}", fingerprinted_name(logical, bytes));
    let dest = output_dir.join(&relative);
    let written = write_if_changed(&dest, bytes).map_err(|e| AssetError::Write {
        path: dest.clone(),
        source: e,
    })?;
    if written {
        debug!(logical, published = %relative, "asset published");
    }
    Ok((relative, written))
}

fn read(path: &Path) -> Result<Vec<u8>, AssetError> {
    fs::read(path).map_err(|e| AssetError::Read {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Publish every file in `static_dir` (hidden entries skipped) and every
/// bundle. Bundle members are resolved against `bundle_root` and joined with
/// a newline.
pub fn publish_static(
    static_dir: Option<&Path>,
    bundles: &BTreeMap<String, Vec<String>>,
    bundle_root: &Path,
    output_dir: &Path,
) -> Result<(AssetManifest, usize), AssetError> {
    let mut manifest = AssetManifest::default();
    let mut written = 0;

    if let Some(dir) = static_dir {
        if !dir.is_dir() {
            return Err(AssetError::StaticDirMissing(dir.to_path_buf()));
        }
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let logical = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let bytes = read(entry.path())?;
            let (published, was_written) =
                publish_bytes(output_dir, ASSETS_SUBDIR, &logical, &bytes)?;
            written += usize::from(was_written);
            manifest.insert(logical, published);
        }
    }

    for (name, members) in bundles {
        let mut bytes = Vec::new();
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                bytes.push(b'\n');
            }
            bytes.extend(read(&bundle_root.join(member))?);
        }
        let (published, was_written) = publish_bytes(output_dir, ASSETS_SUBDIR, name, &bytes)?;
        written += usize::from(was_written);
        manifest.insert(name.clone(), published);
    }

    Ok((manifest, written))
}

/// Publish each source image unchanged under a fingerprinted name.
pub fn publish_originals(
    images: &[SourceImage],
    output_dir: &Path,
) -> Result<(AssetManifest, usize), AssetError> {
    let published: Vec<(String, String, bool)> = images
        .par_iter()
        .map(|image| -> Result<(String, String, bool), AssetError> {
            let bytes = read(&image.path)?;
            let (path, written) =
                publish_bytes(output_dir, ORIGINALS_SUBDIR, &image.filename, &bytes)?;
            Ok((image.filename.clone(), path, written))
        })
        .collect::<Result<_, _>>()?;

    let mut manifest = AssetManifest::default();
    let mut written = 0;
    for (filename, path, was_written) in published {
        written += usize::from(was_written);
        manifest.insert(filename, path);
    }
    Ok((manifest, written))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceFormat;
    use image::metadata::Orientation;
    use tempfile::TempDir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    // =========================================================================
    // Naming
    // =========================================================================

    #[test]
    fn name_embeds_hash_before_extension() {
        let hash = &hash_bytes(b"body")[..HASH_LEN];
        assert_eq!(fingerprinted_name("app.css", b"body"), format!("app.{hash}.css"));
        assert_eq!(
            fingerprinted_name("css/app.min.css", b"body"),
            format!("css/app.min.{hash}.css")
        );
        assert_eq!(fingerprinted_name("LICENSE", b"body"), format!("LICENSE.{hash}"));
    }

    #[test]
    fn same_bytes_same_name_different_bytes_different_name() {
        assert_eq!(
            fingerprinted_name("a.js", b"one"),
            fingerprinted_name("a.js", b"one")
        );
        assert_ne!(
            fingerprinted_name("a.js", b"one"),
            fingerprinted_name("a.js", b"two")
        );
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    #[test]
    fn publish_bytes_skips_identical_destination() {
        let tmp = TempDir::new().unwrap();
        let (path, first) = publish_bytes(tmp.path(), "assets", "a.css", b"body{}").unwrap();
        let (again, second) = publish_bytes(tmp.path(), "assets", "a.css", b"body{}").unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(path, again);
        assert_eq!(fs::read(tmp.path().join(&path)).unwrap(), b"body{}");
    }

    #[test]
    fn static_dir_is_published_with_nested_names() {
        let tmp = TempDir::new().unwrap();
        let static_dir = tmp.path().join("static");
        write(&static_dir.join("css/app.css"), "body{}");
        write(&static_dir.join("nav.js"), "go()");
        write(&static_dir.join(".DS_Store"), "junk");
        let out = tmp.path().join("dist");

        let (manifest, written) =
            publish_static(Some(&static_dir), &BTreeMap::new(), &static_dir, &out).unwrap();

        assert_eq!(written, 2);
        assert_eq!(manifest.len(), 2);
        let css = manifest.get("css/app.css").unwrap();
        assert!(css.starts_with("assets/css/app."));
        assert!(css.ends_with(".css"));
        assert!(out.join(css).exists());
        assert!(manifest.get(".DS_Store").is_none());
    }

    #[test]
    fn bundles_concatenate_members_in_order() {
        let tmp = TempDir::new().unwrap();
        let static_dir = tmp.path().join("static");
        write(&static_dir.join("a.css"), "a{}");
        write(&static_dir.join("b.css"), "b{}");
        let out = tmp.path().join("dist");
        let bundles = BTreeMap::from([(
            "site.css".to_string(),
            vec!["b.css".to_string(), "a.css".to_string()],
        )]);

        let (manifest, _) = publish_static(None, &bundles, &static_dir, &out).unwrap();

        let published = manifest.get("site.css").unwrap();
        assert_eq!(fs::read_to_string(out.join(published)).unwrap(), "b{}\na{}");
    }

    #[test]
    fn missing_bundle_member_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let bundles = BTreeMap::from([("x.js".to_string(), vec!["nope.js".to_string()])]);
        let result = publish_static(None, &bundles, tmp.path(), tmp.path());
        assert!(matches!(result, Err(AssetError::Read { .. })));
    }

    #[test]
    fn missing_static_dir_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = publish_static(
            Some(&tmp.path().join("static")),
            &BTreeMap::new(),
            tmp.path(),
            tmp.path(),
        );
        assert!(matches!(result, Err(AssetError::StaticDirMissing(_))));
    }

    #[test]
    fn originals_are_published_by_filename() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("content/2021/a.jpg");
        write(&path, "jpeg bytes");
        let image = SourceImage {
            filename: "a.jpg".into(),
            path,
            relative_path: "2021/a.jpg".into(),
            size: 10,
            modified_ns: 1,
            dimensions: None,
            format: SourceFormat::Jpeg,
            orientation: Orientation::NoTransforms,
        };
        let out = tmp.path().join("dist");

        let (manifest, written) = publish_originals(&[image.clone()], &out).unwrap();
        let published = manifest.get("a.jpg").unwrap();
        assert!(published.starts_with("images/originals/a."));
        assert_eq!(fs::read(out.join(published)).unwrap(), b"jpeg bytes");
        assert_eq!(written, 1);

        let (_, written_again) = publish_originals(&[image], &out).unwrap();
        assert_eq!(written_again, 0);
    }
}
