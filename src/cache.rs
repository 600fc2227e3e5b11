//! Build cache for incremental derived-asset generation.
//!
//! AVIF encoding is the bottleneck of the build: a single large photo can
//! take seconds through rav1e. This module lets the process stage skip a
//! source image entirely when neither its content nor the rendition settings
//! have changed since the last build.
//!
//! # Design
//!
//! The cache covers only the derived pair (modern + fallback rendition).
//! Scanning, reconciliation and render-context assembly always run, so edits
//! to titles or categories are picked up without a cache bust.
//!
//! ## Keys
//!
//! Records are keyed by the source path relative to the content root. Each
//! record stores:
//!
//! - **`source_hash`**: SHA-256 of the source file. Content-based so it
//!   survives `git checkout` (which resets modification times). The record
//!   also keeps the size and mtime seen when the hash was computed; when both
//!   still match, the stored hash is reused and the source is not re-read.
//!
//! - **`fingerprint`**: SHA-256 over the source hash, the maximum edge, both
//!   quality settings, the encoder speed, the placeholder settings and
//!   [`CODEC_VERSION`]. Changing any setting changes every fingerprint, which
//!   invalidates the whole cache at once.
//!
//! A cache hit requires:
//! 1. A record for the source path whose fingerprint matches
//! 2. Both derived files still on disk
//! 3. Both files' SHA-256 matching what was written
//!
//! ## Storage
//!
//! The index is a JSON file at `<output_dir>/.build-cache.json`, next to the
//! files it describes, so it travels with the output directory when cached in
//! CI. It is loaded once, updated in memory as workers report back, and
//! flushed with a single atomic write after all workers have joined; a reader
//! never sees a half-written index.
//!
//! ## Pruning
//!
//! Records for sources that were not scanned this run are dropped (see
//! [`BuildCache::retain`]); their derived files stay on disk. When a record
//! is replaced, [`BuildCache::insert`] hands back the old one so the caller
//! can delete renditions nothing points at any more.
//!
//! ## Bypassing the cache
//!
//! `build --no-cache` starts from an empty index, so every image is
//! re-encoded. Old derived files are left in place.

use crate::atomic::write_atomic;
use crate::imaging::{DerivedPair, RenditionConfig};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the cache index file within the output directory.
pub const INDEX_FILENAME: &str = ".build-cache.json";

/// Version of the index format. Bump this to invalidate all existing caches
/// when the record layout changes.
const INDEX_VERSION: u32 = 2;

/// Version of the rendition algorithm. Part of every fingerprint; bump it
/// when resizing or encoding changes in a way that alters output bytes.
pub const CODEC_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache index {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to write cache index: {0}")]
    Write(#[from] io::Error),
    #[error("failed to serialize cache index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything known about one source image's last successful rendition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRecord {
    pub source_size: u64,
    pub source_mtime_ns: u64,
    pub source_hash: String,
    pub fingerprint: String,
    pub pair: DerivedPair,
}

/// The persisted cache index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildCache {
    pub version: u32,
    pub entries: BTreeMap<String, CacheRecord>,
    /// Set when an entry was added or changed since load. Never serialized.
    #[serde(skip)]
    dirty: bool,
}

impl BuildCache {
    /// Create an empty index (used for `--no-cache` or the first build).
    pub fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load from the output directory.
    ///
    /// A missing file and a version mismatch both yield an empty index. A file
    /// that exists but cannot be read or parsed is reported as an error so
    /// the caller can surface it; it is still safe to continue with
    /// [`BuildCache::empty`].
    pub fn load(output_dir: &Path) -> Result<Self, CacheError> {
        let path = index_path(output_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(CacheError::Io { path, source: e }),
        };
        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.clone(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(INDEX_VERSION)) {
            debug!(
                found = ?version,
                expected = INDEX_VERSION,
                "cache index version mismatch, starting empty"
            );
            return Ok(Self::empty());
        }
        let cache: Self = serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        debug!(entries = cache.entries.len(), "cache index loaded");
        Ok(cache)
    }

    /// Write the index atomically if anything changed. Returns whether a
    /// write happened.
    pub fn save_if_dirty(&mut self, output_dir: &Path) -> Result<bool, CacheError> {
        if !self.dirty {
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&index_path(output_dir), json.as_bytes())?;
        self.dirty = false;
        Ok(true)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored content hash for `key`, if the file's size and mtime are
    /// unchanged since it was computed.
    pub fn known_source_hash(&self, key: &str, size: u64, mtime_ns: u64) -> Option<&str> {
        if mtime_ns == 0 {
            return None;
        }
        self.entries
            .get(key)
            .filter(|r| r.source_size == size && r.source_mtime_ns == mtime_ns)
            .map(|r| r.source_hash.as_str())
    }

    /// Look up a still-valid derived pair.
    ///
    /// Returns the pair only if the record's fingerprint matches and both
    /// files exist under `output_dir` with the recorded SHA-256.
    pub fn lookup(&self, key: &str, fingerprint: &str, output_dir: &Path) -> Option<&DerivedPair> {
        let record = self.entries.get(key)?;
        if record.fingerprint != fingerprint {
            return None;
        }
        let intact = record.pair.files().iter().all(|file| {
            hash_file(&output_dir.join(&file.path))
                .map(|hash| hash == file.sha256)
                .unwrap_or(false)
        });
        intact.then_some(&record.pair)
    }

    /// Record the result for a source. Marks the index dirty only if the
    /// record actually differs from what is stored, and returns the record
    /// it replaced in that case.
    pub fn insert(&mut self, key: String, record: CacheRecord) -> Option<CacheRecord> {
        if self.entries.get(&key) == Some(&record) {
            return None;
        }
        self.dirty = true;
        self.entries.insert(key, record)
    }

    /// Keep only the records whose key passes `keep`. Returns how many were
    /// dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.dirty = true;
        }
        dropped
    }
}

/// SHA-256 of a byte slice, as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Fingerprint of one image's derived pair.
///
/// Inputs: the source content hash and every setting that influences the
/// output bytes. If any of these change, the previously derived pair is
/// invalid.
pub fn fingerprint(source_hash: &str, config: &RenditionConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"derived-pair\0");
    hasher.update(source_hash.as_bytes());
    hasher.update(b"\0");
    hasher.update(config.max_dimension.to_le_bytes());
    hasher.update(config.modern_quality.value().to_le_bytes());
    hasher.update(config.fallback_quality.value().to_le_bytes());
    hasher.update([config.encoder_speed]);
    match &config.placeholder {
        Some(p) => {
            hasher.update([1u8]);
            hasher.update(p.size.to_le_bytes());
            hasher.update(p.quality.value().to_le_bytes());
            hasher.update((p.max_bytes as u64).to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(CODEC_VERSION.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn fail(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses + self.failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(f, "{} cached, {} encoded", self.hits, self.misses)?;
        } else {
            write!(f, "{} encoded", self.misses)?;
        }
        if self.failures > 0 {
            write!(f, ", {} failed", self.failures)?;
        }
        if self.hits > 0 || self.failures > 0 {
            write!(f, " ({} total)", self.total())?;
        }
        Ok(())
    }
}

/// Resolve the cache index path for an output directory.
pub fn index_path(output_dir: &Path) -> PathBuf {
    output_dir.join(INDEX_FILENAME)
}
