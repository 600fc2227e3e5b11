//! Build orchestration.
//!
//! Runs the phases in order, each one finishing before the next starts:
//!
//! ```text
//! 1. Scan        content_root   →  SourceImage list      (+ duplicate/unreadable warnings)
//! 2. Reconcile   gallery.toml   →  updated store + diff   (written only if stubs were added)
//! 3. Process     sources        →  images/derived/        (parallel, cached)
//! 4. Publish     static/, srcs  →  assets/, images/originals/
//! 5. Render      everything     →  render-context.json
//! ```
//!
//! Fatal errors ([`BuildError`]) stop the build before the next phase. A bad
//! metadata store is caught in phase 2, so nothing is encoded for a project
//! whose metadata cannot be read. Everything recoverable ends up in the
//! [`BuildReport`].

use crate::assets::{AssetError, AssetManifest, PublishedAssets, publish_originals, publish_static};
use crate::cache::CacheStats;
use crate::config::{
    CONFIG_FILENAME, ConfigError, ProjectPaths, SiteConfig, load_config, load_required_config,
};
use crate::imaging::{ImageBackend, RustBackend};
use crate::metadata::MetadataError;
use crate::process::{ProcessConfig, ProcessError, ProcessEvent, process_with_backend};
use crate::reconcile::{Reconciliation, reconcile_store};
use crate::render::{
    ContextInputs, RENDER_CONTEXT_FILENAME, RenderContext, RenderError, build_context,
    write_render_context,
};
use crate::report::BuildReport;
use crate::scan::{ScanError, ScanOutcome, SourceImage, scan_with_backend};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),
    #[error("Asset error: {0}")]
    Assets(#[from] AssetError),
    #[error("Render context error: {0}")]
    Render(#[from] RenderError),
    #[error("build cancelled; completed images were cached")]
    Cancelled,
}

/// How the build was invoked.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// A config file named by the user; it must exist. `None` reads
    /// `config.toml` from the working directory when there is one.
    pub config_path: Option<PathBuf>,
    /// Replaces `content_root` from the config.
    pub source_override: Option<PathBuf>,
    /// Replaces `output_dir` from the config.
    pub output_override: Option<PathBuf>,
    pub use_cache: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            source_override: None,
            output_override: None,
            use_cache: true,
        }
    }
}

impl BuildOptions {
    /// The config file this build reads, named or implied.
    pub fn config_file(&self) -> &Path {
        self.config_path
            .as_deref()
            .unwrap_or(Path::new(CONFIG_FILENAME))
    }
}

/// Loaded config plus the resolved locations it describes.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: SiteConfig,
    pub paths: ProjectPaths,
    /// Directory relative config paths resolve against.
    pub base_dir: PathBuf,
}

impl Project {
    pub fn load(options: &BuildOptions) -> Result<Self, ConfigError> {
        let config_file = options.config_file();
        let config = match &options.config_path {
            Some(path) => load_required_config(path)?,
            None => load_config(config_file)?,
        };
        let base_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut paths = config.resolve_paths(&base_dir);
        if let Some(source) = &options.source_override {
            paths.content_root = source.clone();
        }
        if let Some(output) = &options.output_override {
            paths.output_dir = output.clone();
        }
        debug!(?paths, "project resolved");
        Ok(Self {
            config,
            paths,
            base_dir,
        })
    }

    /// Where bundle members are looked up: the static directory when one is
    /// configured, the project directory otherwise.
    fn bundle_root(&self) -> &Path {
        self.paths.static_dir.as_deref().unwrap_or(&self.base_dir)
    }
}

/// Progress reported between and during phases.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    Scanned {
        root: PathBuf,
        images: usize,
        skipped: usize,
    },
    Reconciled(Reconciliation),
    Processing(ProcessEvent),
    Published {
        statics: usize,
        originals: usize,
        written: usize,
    },
}

/// Result of a completed build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub context: RenderContext,
    pub report: BuildReport,
    pub reconciliation: Reconciliation,
    pub stats: CacheStats,
    pub output_dir: PathBuf,
    pub cache_written: bool,
    pub assets_written: usize,
    pub context_written: bool,
}

impl BuildOutcome {
    pub fn context_path(&self) -> PathBuf {
        self.output_dir.join(RENDER_CONTEXT_FILENAME)
    }
}

/// Result of `check`: what a build would do, with nothing written.
#[derive(Debug)]
pub struct CheckOutcome {
    pub images: Vec<SourceImage>,
    pub reconciliation: Reconciliation,
    pub report: BuildReport,
}

/// Run the full build with the production backend.
pub fn build(
    options: &BuildOptions,
    cancel: &AtomicBool,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildOutcome, BuildError> {
    build_with_backend(Arc::new(RustBackend::new()), options, cancel, events)
}

/// Run the full build using a specific backend (allows testing with mock).
pub fn build_with_backend<B: ImageBackend + 'static>(
    backend: Arc<B>,
    options: &BuildOptions,
    cancel: &AtomicBool,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildOutcome, BuildError> {
    let project = Project::load(options)?;
    let paths = &project.paths;
    let mut report = BuildReport::new();

    let scanned = scan_phase(backend.as_ref(), paths, events.as_ref())?;
    report.extend(scanned.issues);
    let images = scanned.images;

    let (store, reconciliation) = reconcile_store(
        &paths.metadata_file,
        &project.config.default_category,
        &images,
        true,
    )?;
    report.extend(reconciliation.issues());
    emit(events.as_ref(), BuildEvent::Reconciled(reconciliation.clone()));

    let mut process_config = ProcessConfig::from_site_config(&project.config);
    process_config.use_cache = options.use_cache;
    let processed = thread::scope(|s| {
        let forward = events.clone().map(|tx| {
            let (process_tx, process_rx) = mpsc::channel();
            s.spawn(move || {
                for event in process_rx {
                    tx.send(BuildEvent::Processing(event)).ok();
                }
            });
            process_tx
        });
        process_with_backend(
            backend,
            &images,
            &paths.output_dir,
            &process_config,
            cancel,
            forward,
        )
    })?;
    if processed.cancelled {
        info!(stats = %processed.stats, "build cancelled");
        return Err(BuildError::Cancelled);
    }
    report.extend(processed.issues);

    let published = publish_phase(&project, &images)?;
    emit(
        events.as_ref(),
        BuildEvent::Published {
            statics: published.statics.len(),
            originals: published.originals.len(),
            written: published.written,
        },
    );

    let (context, context_issues) = build_context(&ContextInputs {
        title: &project.config.title,
        store: &store,
        sources: &images,
        pairs: &processed.pairs,
        originals: &published.originals,
        assets: &published.statics,
    });
    report.extend(context_issues);
    let context_written = write_render_context(&context, &paths.output_dir)?;

    info!(
        images = images.len(),
        categories = context.categories.len(),
        failures = report.failure_count(),
        warnings = report.warnings().count(),
        "build complete"
    );
    Ok(BuildOutcome {
        context,
        report,
        reconciliation,
        stats: processed.stats,
        output_dir: paths.output_dir.clone(),
        cache_written: processed.cache_written,
        assets_written: published.written,
        context_written,
    })
}

/// Scan and reconcile without writing anything.
pub fn check(options: &BuildOptions) -> Result<CheckOutcome, BuildError> {
    check_with_backend(&RustBackend::new(), options)
}

pub fn check_with_backend(
    backend: &impl ImageBackend,
    options: &BuildOptions,
) -> Result<CheckOutcome, BuildError> {
    let project = Project::load(options)?;
    let paths = &project.paths;
    let mut report = BuildReport::new();

    let scanned = scan_phase(backend, paths, None)?;
    report.extend(scanned.issues);

    let (store, reconciliation) = reconcile_store(
        &paths.metadata_file,
        &project.config.default_category,
        &scanned.images,
        false,
    )?;
    report.extend(reconciliation.issues());

    // Category problems surface here too; nothing is rendered.
    let empty = AssetManifest::default();
    let (_, context_issues) = build_context(&ContextInputs {
        title: &project.config.title,
        store: &store,
        sources: &scanned.images,
        pairs: &BTreeMap::new(),
        originals: &empty,
        assets: &empty,
    });
    report.extend(context_issues);

    Ok(CheckOutcome {
        images: scanned.images,
        reconciliation,
        report,
    })
}

fn scan_phase(
    backend: &impl ImageBackend,
    paths: &ProjectPaths,
    events: Option<&Sender<BuildEvent>>,
) -> Result<ScanOutcome, ScanError> {
    let scanned = scan_with_backend(
        backend,
        &paths.content_root,
        std::slice::from_ref(&paths.output_dir),
    )?;
    emit(
        events,
        BuildEvent::Scanned {
            root: paths.content_root.clone(),
            images: scanned.images.len(),
            skipped: scanned.issues.len(),
        },
    );
    Ok(scanned)
}

fn publish_phase(project: &Project, images: &[SourceImage]) -> Result<PublishedAssets, AssetError> {
    let output_dir = &project.paths.output_dir;
    let (statics, mut written) = publish_static(
        project.paths.static_dir.as_deref(),
        &project.config.assets.bundles,
        project.bundle_root(),
        output_dir,
    )?;
    let originals = if project.config.assets.publish_originals {
        let (originals, originals_written) = publish_originals(images, output_dir)?;
        written += originals_written;
        originals
    } else {
        AssetManifest::default()
    };
    Ok(PublishedAssets {
        statics,
        originals,
        written,
    })
}

fn emit(events: Option<&Sender<BuildEvent>>, event: BuildEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}
