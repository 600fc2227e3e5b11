//! Content discovery.
//!
//! First phase of the build. Walks the content root recursively and turns
//! every supported image into a [`SourceImage`]: where it lives, how big it
//! is, when it last changed, and what its header says (pixel dimensions,
//! container format, EXIF orientation). No pixels are decoded here.
//!
//! ## Rules
//!
//! - Supported extensions: `jpg`, `jpeg`, `png`, `gif`, `webp`, any case.
//! - Hidden files and directories (leading `.`) are skipped, as are any
//!   excluded directories (the output directory when it sits inside the
//!   content root).
//! - Directory entries are visited sorted by name, so the result is the same
//!   on every filesystem.
//! - A filename is an image's identity across the whole tree, compared
//!   case-insensitively. The first path in traversal order wins; later ones
//!   are reported as [`Issue::DuplicateAsset`] and dropped.
//! - Files that cannot be read (permissions, zero bytes) are skipped with an
//!   [`Issue::UnreadableFile`]. Files that can be read but whose header does
//!   not parse are kept with unknown dimensions: the pipeline then reports
//!   them as per-image failures with the decoder's own message.
//!
//! A missing or unreadable content root is fatal ([`ScanError`]).

use crate::imaging::{BackendError, Dimensions, ImageBackend, RustBackend, oriented_dimensions};
use crate::report::Issue;
use crate::types::SourceFormat;
use image::metadata::Orientation;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("content root {0} does not exist")]
    ContentRootMissing(PathBuf),
    #[error("content root {0} is not a directory")]
    ContentRootNotDirectory(PathBuf),
    #[error("content root {path} is unreadable: {source}")]
    ContentRootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A discovered source image.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    /// File name including extension; the image's identity.
    pub filename: String,
    /// Full path on disk.
    pub path: PathBuf,
    /// Path relative to the content root, `/`-separated.
    pub relative_path: String,
    pub size: u64,
    /// Modification time as nanoseconds since the Unix epoch (0 if unknown).
    pub modified_ns: u64,
    /// Stored pixel dimensions, `None` when the header could not be parsed.
    pub dimensions: Option<Dimensions>,
    pub format: SourceFormat,
    pub orientation: Orientation,
}

impl SourceImage {
    /// Dimensions as displayed, i.e. with the EXIF orientation applied.
    pub fn display_dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
            .map(|d| oriented_dimensions((d.width, d.height), self.orientation))
    }
}

/// Discovered images in traversal order, plus everything skipped on the way.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub images: Vec<SourceImage>,
    pub issues: Vec<Issue>,
}

/// Scan `root` with the production backend.
pub fn scan(root: &Path, exclude: &[PathBuf]) -> Result<ScanOutcome, ScanError> {
    scan_with_backend(&RustBackend::new(), root, exclude)
}

/// Scan `root` using a specific backend for header probes (allows testing
/// with a mock).
pub fn scan_with_backend(
    backend: &impl ImageBackend,
    root: &Path,
    exclude: &[PathBuf],
) -> Result<ScanOutcome, ScanError> {
    check_root(root)?;

    let mut outcome = ScanOutcome::default();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || (!is_hidden(e) && !is_excluded(e, exclude)));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.into());
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                outcome.issues.push(Issue::UnreadableFile {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(extension_format) = SourceFormat::from_path(entry.path()) else {
            continue;
        };
        let filename = entry.file_name().to_string_lossy().into_owned();

        let key = filename.to_lowercase();
        if let Some(kept) = seen.get(&key) {
            warn!(
                filename = %filename,
                kept = %kept.display(),
                dropped = %entry.path().display(),
                "duplicate filename"
            );
            outcome.issues.push(Issue::DuplicateAsset {
                filename,
                kept: kept.clone(),
                dropped: entry.path().to_path_buf(),
            });
            continue;
        }

        match read_source(backend, root, &entry, filename, extension_format) {
            Ok(image) => {
                seen.insert(key, image.path.clone());
                outcome.images.push(image);
            }
            Err(issue) => {
                warn!("{issue}");
                outcome.issues.push(issue);
            }
        }
    }

    debug!(
        root = %root.display(),
        images = outcome.images.len(),
        issues = outcome.issues.len(),
        "scan complete"
    );
    Ok(outcome)
}

fn check_root(root: &Path) -> Result<(), ScanError> {
    let meta = fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScanError::ContentRootMissing(root.to_path_buf()),
        _ => ScanError::ContentRootUnreadable {
            path: root.to_path_buf(),
            source: e,
        },
    })?;
    if !meta.is_dir() {
        return Err(ScanError::ContentRootNotDirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|e| ScanError::ContentRootUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_excluded(entry: &DirEntry, exclude: &[PathBuf]) -> bool {
    entry.file_type().is_dir() && exclude.iter().any(|dir| same_dir(entry.path(), dir))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn read_source(
    backend: &impl ImageBackend,
    root: &Path,
    entry: &DirEntry,
    filename: String,
    extension_format: SourceFormat,
) -> Result<SourceImage, Issue> {
    let path = entry.path().to_path_buf();
    let unreadable = |reason: String| Issue::UnreadableFile {
        path: path.clone(),
        reason,
    };

    let meta = entry.metadata().map_err(|e| unreadable(e.to_string()))?;
    if meta.len() == 0 {
        return Err(unreadable("file is empty".into()));
    }
    let modified_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let (dimensions, format, orientation) = match backend.identify(&path) {
        Ok(probe) => (
            Some(probe.dimensions),
            probe.format.unwrap_or(extension_format),
            probe.orientation,
        ),
        Err(BackendError::Io(e)) => return Err(unreadable(e.to_string())),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "header unreadable, deferring to pipeline");
            (None, extension_format, Orientation::NoTransforms)
        }
    };

    let relative_path = path
        .strip_prefix(root)
        .unwrap_or(&path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Ok(SourceImage {
        filename,
        path,
        relative_path,
        size: meta.len(),
        modified_ns,
        dimensions,
        format,
        orientation,
    })
}
