//! The metadata store.
//!
//! A single human-edited TOML file (`gallery.toml` by default) holds what the
//! filesystem cannot: the order of categories, which category each image
//! belongs to, and optional titles and descriptions.
//!
//! ```toml
//! categories = ["Trips", "Uncategorized"]
//!
//! [[images]]
//! filename = "a.jpg"
//! category = "Trips"
//! title = "Harbour at dusk"
//! description = ""
//! ```
//!
//! ## Ordering
//!
//! Category order is the user's declaration order and is never rearranged by
//! the build. The default category (see [`CategoryOrdering`]) always exists:
//! if the user did not declare it, it sits implicitly at the tail. Image order
//! within a category is the order of `[[images]]` tables.
//!
//! ## Validation
//!
//! Loading rejects anything that would make later phases guess: TOML syntax
//! errors, unknown keys, duplicate category names, duplicate or empty
//! filenames and entries without a category. Every error names the file and
//! the offending value. Nothing is ever written after a failed load.
//!
//! ## Resolution
//!
//! Titles and descriptions are optional. Empty strings count as absent, so a
//! stub entry (`title = ""`) falls back to the filename-derived title; see
//! [`resolve`].

use crate::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const STORE_HEADER: &str = "\
# Gallery metadata.
# Category order is display order. New images are appended below under the
# default category; move them, add titles and descriptions freely.
";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("metadata store {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("metadata store {path}: category \"{name}\" is declared more than once")]
    DuplicateCategory { path: PathBuf, name: String },
    #[error("metadata store {path}: image \"{filename}\" is listed more than once")]
    DuplicateFilename { path: PathBuf, filename: String },
    #[error("metadata store {path}: {field} must not be empty")]
    EmptyField { path: PathBuf, field: String },
    #[error("failed to serialize metadata store: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write metadata store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Per-image metadata, keyed by filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataEntry {
    pub filename: String,
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// No source file matches this entry. Set by reconciliation, never
    /// persisted.
    #[serde(skip)]
    pub missing: bool,
}

impl MetadataEntry {
    /// A fresh entry for a newly discovered image.
    pub fn stub(filename: &str, category: &str) -> Self {
        Self {
            filename: filename.to_string(),
            category: category.to_string(),
            title: String::new(),
            description: String::new(),
            missing: false,
        }
    }

    pub fn title(&self) -> Option<&str> {
        non_empty(&self.title)
    }

    pub fn description(&self) -> Option<&str> {
        non_empty(&self.description)
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s.trim()).filter(|s| !s.is_empty())
}

/// Category names in display order, with the default category as a sentinel
/// that is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOrdering {
    declared: Vec<String>,
    default: String,
}

impl CategoryOrdering {
    pub fn new(declared: Vec<String>, default: impl Into<String>) -> Self {
        Self {
            declared,
            default: default.into(),
        }
    }

    /// Names exactly as written in the store.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Every category in display order: the declared ones, then the default
    /// unless it was declared somewhere already.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declared.iter().map(String::as_str).collect();
        if !self.declares_default() {
            names.push(&self.default);
        }
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        name == self.default || self.declared.iter().any(|c| c == name)
    }

    fn declares_default(&self) -> bool {
        self.declared.iter().any(|c| *c == self.default)
    }

    /// Write the implicit default into the declared list (at the tail).
    /// Returns whether anything changed.
    pub fn materialize_default(&mut self) -> bool {
        if self.declares_default() {
            return false;
        }
        self.declared.push(self.default.clone());
        true
    }
}

/// The on-disk shape of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreFile {
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    images: Vec<MetadataEntry>,
}

/// The loaded metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStore {
    pub categories: CategoryOrdering,
    pub images: Vec<MetadataEntry>,
}

impl MetadataStore {
    pub fn empty(default_category: &str) -> Self {
        Self {
            categories: CategoryOrdering::new(Vec::new(), default_category),
            images: Vec::new(),
        }
    }

    /// Load and validate the store. A missing file is an empty store.
    pub fn load(path: &Path, default_category: &str) -> Result<Self, MetadataError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no metadata store yet");
                return Ok(Self::empty(default_category));
            }
            Err(e) => {
                return Err(MetadataError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::parse(&content, path, default_category)
    }

    /// Parse store text. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path, default_category: &str) -> Result<Self, MetadataError> {
        let file: StoreFile = toml::from_str(content).map_err(|e| MetadataError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        validate(&file, path)?;
        Ok(Self {
            categories: CategoryOrdering::new(file.categories, default_category),
            images: file.images,
        })
    }

    /// Serialize with the header comment.
    pub fn to_toml(&self) -> Result<String, MetadataError> {
        let file = StoreFile {
            categories: self.categories.declared().to_vec(),
            images: self.images.clone(),
        };
        let body = toml::to_string(&file)?;
        Ok(format!("{STORE_HEADER}\n{body}"))
    }

    /// Write the store atomically.
    pub fn save(&self, path: &Path) -> Result<(), MetadataError> {
        let text = self.to_toml()?;
        write_atomic(path, text.as_bytes()).map_err(|e| MetadataError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn entry(&self, filename: &str) -> Option<&MetadataEntry> {
        self.images.iter().find(|e| e.filename == filename)
    }
}

fn validate(file: &StoreFile, path: &Path) -> Result<(), MetadataError> {
    let empty = |field: String| MetadataError::EmptyField {
        path: path.to_path_buf(),
        field,
    };

    let mut categories = HashSet::new();
    for (i, name) in file.categories.iter().enumerate() {
        if name.trim().is_empty() {
            return Err(empty(format!("categories[{i}]")));
        }
        if !categories.insert(name.as_str()) {
            return Err(MetadataError::DuplicateCategory {
                path: path.to_path_buf(),
                name: name.clone(),
            });
        }
    }

    let mut filenames = HashSet::new();
    for (i, entry) in file.images.iter().enumerate() {
        if entry.filename.trim().is_empty() {
            return Err(empty(format!("images[{i}].filename")));
        }
        if entry.category.trim().is_empty() {
            return Err(empty(format!("images[{i}].category ({})", entry.filename)));
        }
        if !filenames.insert(entry.filename.as_str()) {
            return Err(MetadataError::DuplicateFilename {
                path: path.to_path_buf(),
                filename: entry.filename.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve a display field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value.
///
/// ```text
/// title: resolve(&[entry.title(), Some(&display_title(filename))])
/// ```
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}
