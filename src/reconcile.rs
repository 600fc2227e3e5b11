//! Metadata reconciliation.
//!
//! Compares what the scanner found with what the metadata store lists and
//! produces a typed diff:
//!
//! - **added**: sources without an entry. Each gets a stub (default
//!   category, empty title and description) appended to the end of the
//!   store's image list, in scan order.
//! - **missing**: entries without a source. They stay in the store, flagged
//!   so rendering can show a placeholder. Nothing is ever deleted.
//! - **existing**: entries with a source. Untouched.
//!
//! Existing categories are never reordered. The default category is written
//! into the declared list (at the tail) only when a stub actually lands in
//! it. The store is written if and only if `added` is non-empty, so a second
//! run over the same tree produces no diff and no write.
//!
//! Filenames match exactly; the scanner has already de-duplicated them.

use crate::metadata::{MetadataEntry, MetadataError, MetadataStore};
use crate::report::Issue;
use crate::scan::SourceImage;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// The diff between scanned sources and the metadata store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// New filenames, in scan order.
    pub added: Vec<String>,
    /// Store entries with no source, in store order.
    pub missing: Vec<String>,
    /// Store entries with a source, in store order.
    pub existing: Vec<String>,
}

impl Reconciliation {
    /// Whether applying this diff changes the persisted store.
    pub fn needs_write(&self) -> bool {
        !self.added.is_empty()
    }

    /// One warning per entry whose source is gone.
    pub fn issues(&self) -> Vec<Issue> {
        self.missing
            .iter()
            .map(|filename| Issue::MissingAsset {
                filename: filename.clone(),
            })
            .collect()
    }
}

/// Compute the diff. Pure: neither argument is modified.
pub fn reconcile(store: &MetadataStore, sources: &[SourceImage]) -> Reconciliation {
    let on_disk: HashSet<&str> = sources.iter().map(|s| s.filename.as_str()).collect();
    let listed: HashSet<&str> = store.images.iter().map(|e| e.filename.as_str()).collect();

    let (existing, missing): (Vec<_>, Vec<_>) = store
        .images
        .iter()
        .map(|e| e.filename.clone())
        .partition(|f| on_disk.contains(f.as_str()));

    let added = sources
        .iter()
        .filter(|s| !listed.contains(s.filename.as_str()))
        .map(|s| s.filename.clone())
        .collect();

    Reconciliation {
        added,
        missing,
        existing,
    }
}

/// Apply a diff to the in-memory store: append stubs and set the runtime
/// missing flags.
pub fn apply(store: &mut MetadataStore, diff: &Reconciliation) {
    let missing: HashSet<&str> = diff.missing.iter().map(String::as_str).collect();
    for entry in &mut store.images {
        entry.missing = missing.contains(entry.filename.as_str());
    }

    if diff.added.is_empty() {
        return;
    }
    let default = store.categories.default_name().to_string();
    store.images.extend(
        diff.added
            .iter()
            .map(|filename| MetadataEntry::stub(filename, &default)),
    );
    store.categories.materialize_default();
}

/// Load the store at `path`, reconcile it against `sources` and, when `write`
/// is set and stubs were added, persist it.
///
/// A malformed store fails here, before anything is written.
pub fn reconcile_store(
    path: &Path,
    default_category: &str,
    sources: &[SourceImage],
    write: bool,
) -> Result<(MetadataStore, Reconciliation), MetadataError> {
    let mut store = MetadataStore::load(path, default_category)?;
    let diff = reconcile(&store, sources);
    apply(&mut store, &diff);

    if write && diff.needs_write() {
        store.save(path)?;
        info!(
            path = %path.display(),
            added = diff.added.len(),
            "metadata store updated"
        );
    } else {
        debug!(
            added = diff.added.len(),
            missing = diff.missing.len(),
            existing = diff.existing.len(),
            "metadata store unchanged on disk"
        );
    }
    Ok((store, diff))
}
