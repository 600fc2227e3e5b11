//! Derived asset generation.
//!
//! Stage 3 of the build. Takes the scanned sources and guarantees each one a
//! size-bounded modern rendition (AVIF) and a fallback rendition (JPEG) under
//! `<output>/images/derived/`.
//!
//! ## Output Structure
//!
//! ```text
//! dist/
//! ├── .build-cache.json                  # cache index, flushed once per run
//! └── images/derived/
//!     ├── harbour-3f9a1c2b.avif
//!     ├── harbour-3f9a1c2b.jpg
//!     ├── spinner-77ab01de.gif           # animated GIF, copied through
//!     └── spinner-77ab01de.jpg
//! ```
//!
//! ## Default Configuration
//!
//! ```text
//! Longest edge: 800px (never upscaled)
//! AVIF quality: 80, speed 6
//! JPEG quality: 90
//! Timeout:      120s per image
//! ```
//!
//! ## Parallel Processing
//!
//! Images are processed on a dedicated [rayon](https://docs.rs/rayon) pool
//! sized by [`effective_threads`]. Workers only read the cache index; each
//! returns its own record, and records are merged after the pool joins.
//! The index is then written once, atomically, and only if something
//! changed.
//!
//! ## Failures
//!
//! A source that cannot be decoded, encoded or finished within the timeout
//! becomes an [`Issue::ImageProcessing`] and gets no derived pair. Other
//! images are unaffected. A timed-out render keeps running on its detached
//! thread; anything it writes lands under a fingerprinted name that no cache
//! record points at. Once [`ProcessConfig::max_stalled_renders`] of those are
//! still running, further images fail without being started.
//!
//! ## Stale Files
//!
//! When a source changes, the renditions its previous record named are
//! deleted unless another current record still uses them. Records for
//! sources that were not scanned are dropped from the index; their files are
//! left alone.
//!
//! ## Cancellation
//!
//! When the cancel flag is raised, workers finish the image they are on and
//! start no new ones. Completed work is still merged and flushed, so the next
//! run resumes from there.

use crate::cache::{
    BuildCache, CacheError, CacheRecord, CacheStats, fingerprint, hash_file, index_path,
};
use crate::config::{SiteConfig, effective_threads};
use crate::imaging::{
    DerivedPair, ImageBackend, PlaceholderSpec, Quality, RenditionConfig, RustBackend, SourceSpec,
    create_derived_pair, size_reduction,
};
use crate::report::Issue;
use crate::scan::SourceImage;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Derived renditions live here, relative to the output directory.
pub const DERIVED_SUBDIR: &str = "images/derived";

/// Default for [`ProcessConfig::max_stalled_renders`].
pub const MAX_STALLED_RENDERS: usize = 4;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Configuration for derived asset generation.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub rendition: RenditionConfig,
    pub threads: usize,
    pub timeout: Duration,
    /// Consult the cache index. When false every image is re-encoded; the
    /// index is still rewritten with the fresh results.
    pub use_cache: bool,
    /// Timed-out renders allowed to keep running before new images are
    /// refused.
    pub max_stalled_renders: usize,
}

impl ProcessConfig {
    /// Build a ProcessConfig from SiteConfig values.
    pub fn from_site_config(config: &SiteConfig) -> Self {
        let t = &config.thumbnails;
        Self {
            rendition: RenditionConfig {
                max_dimension: t.max_dimension,
                modern_quality: Quality::new(t.modern_quality),
                fallback_quality: Quality::new(t.fallback_quality),
                encoder_speed: t.encoder_speed,
                placeholder: t.placeholder.then(|| PlaceholderSpec {
                    size: t.placeholder_size,
                    quality: Quality::new(t.placeholder_quality),
                    max_bytes: t.placeholder_max_bytes,
                }),
                max_decode_bytes: config.processing.max_decode_bytes(),
            },
            threads: effective_threads(&config.processing),
            timeout: config.processing.timeout(),
            use_cache: true,
            max_stalled_renders: MAX_STALLED_RENDERS,
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self::from_site_config(&SiteConfig::default())
    }
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Cached,
    Encoded,
    Failed(String),
}

/// Progress events streamed to the CLI while workers run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Started {
        image_count: usize,
        threads: usize,
    },
    ImageProcessed {
        /// 1-based position in scan order.
        index: usize,
        filename: String,
        status: ImageStatus,
        /// Derived file paths relative to the output directory.
        outputs: Vec<String>,
    },
}

/// Result of the processing phase.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    /// Derived pairs by source filename. Failed images are absent.
    pub pairs: BTreeMap<String, DerivedPair>,
    pub issues: Vec<Issue>,
    pub stats: CacheStats,
    /// The cancel flag was raised; some images were not started.
    pub cancelled: bool,
    /// The cache index was rewritten.
    pub cache_written: bool,
    /// Index records dropped because their source was not scanned.
    pub pruned: usize,
    /// Superseded derived files deleted from the output directory.
    pub removed: usize,
}

/// What a worker hands back for merging.
enum WorkerResult {
    Done {
        pair: DerivedPair,
        record: CacheRecord,
        cached: bool,
    },
    Failed(String),
    Skipped,
}

/// Process `images` with the production backend.
pub fn process(
    images: &[SourceImage],
    output_dir: &Path,
    config: &ProcessConfig,
    cancel: &AtomicBool,
    events: Option<Sender<ProcessEvent>>,
) -> Result<ProcessOutcome, ProcessError> {
    process_with_backend(
        Arc::new(RustBackend::new()),
        images,
        output_dir,
        config,
        cancel,
        events,
    )
}

/// Process images using a specific backend (allows testing with mock).
pub fn process_with_backend<B: ImageBackend + 'static>(
    backend: Arc<B>,
    images: &[SourceImage],
    output_dir: &Path,
    config: &ProcessConfig,
    cancel: &AtomicBool,
    events: Option<Sender<ProcessEvent>>,
) -> Result<ProcessOutcome, ProcessError> {
    let mut outcome = ProcessOutcome::default();

    let mut cache = if config.use_cache {
        BuildCache::load(output_dir).unwrap_or_else(|e| {
            warn!(error = %e, "cache index unusable, starting empty");
            outcome.issues.push(Issue::CacheCorruption {
                path: index_path(output_dir),
                reason: e.to_string(),
            });
            BuildCache::empty()
        })
    } else {
        BuildCache::empty()
    };

    let stalled = Arc::new(AtomicUsize::new(0));
    let threads = config.threads.max(1);
    if let Some(tx) = &events {
        tx.send(ProcessEvent::Started {
            image_count: images.len(),
            threads,
        })
        .ok();
    }
    info!(images = images.len(), threads, "processing images");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("derive-{i}"))
        .build()?;

    let results: Vec<WorkerResult> = pool.install(|| {
        images
            .par_iter()
            .enumerate()
            .map(|(i, image)| {
                if cancel.load(Ordering::SeqCst) {
                    return WorkerResult::Skipped;
                }
                let result = process_one(&backend, &cache, image, output_dir, config, &stalled);
                if let Some(tx) = &events {
                    tx.send(progress_event(i + 1, image, &result)).ok();
                }
                result
            })
            .collect()
    });
    drop(events);

    let mut replaced = Vec::new();
    for (image, result) in images.iter().zip(results) {
        match result {
            WorkerResult::Done {
                pair,
                record,
                cached,
            } => {
                if cached {
                    outcome.stats.hit();
                } else {
                    outcome.stats.miss();
                }
                if let Some(previous) = cache.insert(image.relative_path.clone(), record) {
                    replaced.extend(previous.pair.files().map(|f| f.path.clone()));
                }
                outcome.pairs.insert(image.filename.clone(), pair);
            }
            WorkerResult::Failed(reason) => {
                warn!(filename = %image.filename, %reason, "image failed");
                outcome.stats.fail();
                outcome.issues.push(Issue::ImageProcessing {
                    filename: image.filename.clone(),
                    reason,
                });
            }
            WorkerResult::Skipped => outcome.cancelled = true,
        }
    }

    let scanned: HashSet<&str> = images.iter().map(|i| i.relative_path.as_str()).collect();
    outcome.pruned = cache.retain(|key| scanned.contains(key));
    outcome.removed = remove_superseded(output_dir, &replaced, &cache);

    outcome.cache_written = cache.save_if_dirty(output_dir)?;
    debug!(
        stats = %outcome.stats,
        pruned = outcome.pruned,
        removed = outcome.removed,
        cache_written = outcome.cache_written,
        "processing complete"
    );
    Ok(outcome)
}

/// Delete derived files from replaced records that no current record still
/// names. Returns how many were deleted.
fn remove_superseded(output_dir: &Path, replaced: &[String], cache: &BuildCache) -> usize {
    let live: HashSet<&str> = cache
        .entries
        .values()
        .flat_map(|r| r.pair.files())
        .map(|f| f.path.as_str())
        .collect();
    replaced
        .iter()
        .filter(|path| !live.contains(path.as_str()))
        .filter(|path| match std::fs::remove_file(output_dir.join(path)) {
            Ok(()) => {
                debug!(%path, "removed superseded rendition");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(%path, error = %e, "could not remove superseded rendition");
                false
            }
        })
        .count()
}

fn progress_event(index: usize, image: &SourceImage, result: &WorkerResult) -> ProcessEvent {
    let (status, outputs) = match result {
        WorkerResult::Done { pair, cached, .. } => (
            if *cached {
                ImageStatus::Cached
            } else {
                ImageStatus::Encoded
            },
            pair.files().iter().map(|f| f.path.clone()).collect(),
        ),
        WorkerResult::Failed(reason) => (ImageStatus::Failed(reason.clone()), Vec::new()),
        WorkerResult::Skipped => (ImageStatus::Failed("cancelled".into()), Vec::new()),
    };
    ProcessEvent::ImageProcessed {
        index,
        filename: image.filename.clone(),
        status,
        outputs,
    }
}

fn process_one<B: ImageBackend + 'static>(
    backend: &Arc<B>,
    cache: &BuildCache,
    image: &SourceImage,
    output_dir: &Path,
    config: &ProcessConfig,
    stalled: &Arc<AtomicUsize>,
) -> WorkerResult {
    let Some(display_dimensions) = image.display_dimensions() else {
        let reason = match backend.identify(&image.path) {
            Err(e) => e.to_string(),
            Ok(_) => "image header could not be read during scan".to_string(),
        };
        return WorkerResult::Failed(reason);
    };

    let key = image.relative_path.as_str();
    let source_hash = match cache.known_source_hash(key, image.size, image.modified_ns) {
        Some(hash) => hash.to_string(),
        None => match hash_file(&image.path) {
            Ok(hash) => hash,
            Err(e) => return WorkerResult::Failed(format!("failed to read source: {e}")),
        },
    };
    let fingerprint = fingerprint(&source_hash, &config.rendition);
    let record = |pair: DerivedPair| CacheRecord {
        source_size: image.size,
        source_mtime_ns: image.modified_ns,
        source_hash: source_hash.clone(),
        fingerprint: fingerprint.clone(),
        pair,
    };

    if config.use_cache
        && let Some(pair) = cache.lookup(key, &fingerprint, output_dir)
    {
        debug!(filename = %image.filename, "cache hit");
        return WorkerResult::Done {
            pair: pair.clone(),
            record: record(pair.clone()),
            cached: true,
        };
    }

    let job = RenderJob {
        path: image.path.clone(),
        display_dimensions,
        passthrough: image.format.is_passthrough(),
        filename: image.filename.clone(),
        fingerprint: fingerprint.clone(),
        output_dir: output_dir.to_path_buf(),
        rendition: config.rendition.clone(),
    };
    let limits = RenderLimits {
        timeout: config.timeout,
        stalled: Arc::clone(stalled),
        max_stalled: config.max_stalled_renders,
    };
    match render_with_timeout(Arc::clone(backend), job, &limits) {
        Ok(pair) => {
            let modern_saving = size_reduction(image.size, pair.modern.bytes);
            let fallback_saving = size_reduction(image.size, pair.fallback.bytes);
            debug!(
                filename = %image.filename,
                modern_saving = %format!("{modern_saving:.0}%"),
                fallback_saving = %format!("{fallback_saving:.0}%"),
                "encoded"
            );
            WorkerResult::Done {
                pair: pair.clone(),
                record: record(pair),
                cached: false,
            }
        }
        Err(reason) => WorkerResult::Failed(reason),
    }
}

/// Everything a detached render thread needs, owned.
struct RenderJob {
    path: PathBuf,
    display_dimensions: (u32, u32),
    passthrough: bool,
    filename: String,
    fingerprint: String,
    output_dir: PathBuf,
    rendition: RenditionConfig,
}

/// Deadline for one render plus the shared count of renders that missed it.
struct RenderLimits {
    timeout: Duration,
    stalled: Arc<AtomicUsize>,
    max_stalled: usize,
}

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Moved into the render thread. On exit, normal or unwinding, releases the
/// stall slot if the waiter had already given up on this render.
struct RenderGuard {
    state: Arc<AtomicU8>,
    stalled: Arc<AtomicUsize>,
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        if self.state.swap(FINISHED, Ordering::SeqCst) == ABANDONED {
            self.stalled.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Run one render on its own thread and give up waiting after the timeout.
fn render_with_timeout<B: ImageBackend + 'static>(
    backend: Arc<B>,
    job: RenderJob,
    limits: &RenderLimits,
) -> Result<DerivedPair, String> {
    let stuck = limits.stalled.load(Ordering::SeqCst);
    if stuck >= limits.max_stalled {
        return Err(format!("not started: {stuck} timed-out renders are still running"));
    }

    let (tx, rx) = mpsc::channel();
    let state = Arc::new(AtomicU8::new(RUNNING));
    let guard = RenderGuard {
        state: Arc::clone(&state),
        stalled: Arc::clone(&limits.stalled),
    };
    let name = format!("render-{}", job.filename);
    std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            let _guard = guard;
            let source = SourceSpec {
                path: &job.path,
                display_dimensions: job.display_dimensions,
                passthrough: job.passthrough,
            };
            let result = create_derived_pair(
                backend.as_ref(),
                &source,
                &job.filename,
                &job.fingerprint,
                &job.output_dir,
                DERIVED_SUBDIR,
                &job.rendition,
            );
            tx.send(result).ok();
        })
        .map_err(|e| format!("failed to start render thread: {e}"))?;

    match rx.recv_timeout(limits.timeout) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(RecvTimeoutError::Timeout) => {
            // Count first so the thread can never release a slot not yet taken.
            limits.stalled.fetch_add(1, Ordering::SeqCst);
            if state
                .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                limits.stalled.fetch_sub(1, Ordering::SeqCst);
            }
            Err(format!("timed out after {}s", limits.timeout.as_secs_f64()))
        }
        Err(RecvTimeoutError::Disconnected) => Err("render thread panicked".to_string()),
    }
}
