//! Render context assembly.
//!
//! Final stage of the build. Combines the reconciled metadata store, the
//! derived pairs and the published asset names into one ordered structure
//! for the templating layer, and persists it as
//! `<output>/render-context.json`.
//!
//! ## Ordering
//!
//! Categories appear exactly in [`CategoryOrdering::names`] order and images
//! in their `[[images]]` declaration order. Nothing is re-sorted. Categories
//! without images are left out.
//!
//! ## Per-image fields
//!
//! | Field | Source |
//! |---|---|
//! | `id` | slug of the filename, suffixed `-2`, `-3`… on collision |
//! | `title` | store title, else [`display_title`] of the filename |
//! | `description` | store description, if any |
//! | `alt_text` | description, else title |
//! | `modern` / `fallback` | derived pair (absent if processing failed) |
//! | `placeholder` | inline `data:` URL preview from the derived pair |
//! | `original` | published original (absent if not published) |
//! | `width` / `height` | displayed source dimensions |
//!
//! Entries whose source is gone keep their place with `missing: true` so a
//! template can draw a stand-in. Entries pointing at an undeclared
//! category are reported and skipped.
//!
//! [`CategoryOrdering::names`]: crate::metadata::CategoryOrdering::names

use crate::assets::AssetManifest;
use crate::atomic::write_if_changed;
use crate::imaging::{DerivedFile, DerivedPair};
use crate::metadata::{MetadataEntry, MetadataStore, resolve};
use crate::naming::{display_title, sanitize_slug};
use crate::report::Issue;
use crate::scan::SourceImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

/// File name of the persisted context within the output directory.
pub const RENDER_CONTEXT_FILENAME: &str = "render-context.json";

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to serialize render context: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write render context: {0}")]
    Io(#[from] std::io::Error),
}

/// One derived file as the templates see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub path: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl From<&DerivedFile> for AssetRef {
    fn from(file: &DerivedFile) -> Self {
        Self {
            path: file.path.clone(),
            media_type: file.format.media_type().to_string(),
            width: file.width,
            height: file.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderImage {
    pub id: String,
    pub filename: String,
    pub title: String,
    pub description: Option<String>,
    pub alt_text: String,
    pub category: String,
    pub missing: bool,
    pub original: Option<String>,
    pub modern: Option<AssetRef>,
    pub fallback: Option<AssetRef>,
    /// Tiny JPEG as a `data:` URL, for showing while `modern` loads.
    pub placeholder: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderCategory {
    pub name: String,
    pub slug: String,
    pub is_default: bool,
    pub images: Vec<RenderImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    pub title: String,
    pub categories: Vec<RenderCategory>,
    /// Logical static asset name → fingerprinted path.
    pub assets: AssetManifest,
}

/// Inputs to [`build_context`], borrowed from the earlier phases.
pub struct ContextInputs<'a> {
    pub title: &'a str,
    pub store: &'a MetadataStore,
    pub sources: &'a [SourceImage],
    pub pairs: &'a BTreeMap<String, DerivedPair>,
    pub originals: &'a AssetManifest,
    pub assets: &'a AssetManifest,
}

/// Hands out unique slugs: the first `base` is kept, later ones get `-2`,
/// `-3`, and so on.
#[derive(Default)]
struct SlugAllocator {
    taken: HashMap<String, usize>,
}

impl SlugAllocator {
    fn allocate(&mut self, text: &str, fallback: &str) -> String {
        let base = match sanitize_slug(text) {
            s if s.is_empty() => fallback.to_string(),
            s => s,
        };
        let mut n = *self.taken.get(&base).unwrap_or(&0);
        loop {
            n += 1;
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            if !self.taken.contains_key(&candidate) {
                self.taken.insert(base.clone(), n);
                self.taken.insert(candidate.clone(), 1);
                return candidate;
            }
        }
    }
}

/// Assemble the render context. Returns it with any warnings raised.
pub fn build_context(inputs: &ContextInputs<'_>) -> (RenderContext, Vec<Issue>) {
    let ordering = &inputs.store.categories;
    let sources: HashMap<&str, &SourceImage> = inputs
        .sources
        .iter()
        .map(|s| (s.filename.as_str(), s))
        .collect();

    let mut issues = Vec::new();
    let mut grouped: HashMap<&str, Vec<&MetadataEntry>> = HashMap::new();
    for entry in &inputs.store.images {
        if !ordering.contains(&entry.category) {
            issues.push(Issue::UnknownCategory {
                filename: entry.filename.clone(),
                category: entry.category.clone(),
            });
            continue;
        }
        grouped.entry(entry.category.as_str()).or_default().push(entry);
    }

    let mut image_ids = SlugAllocator::default();
    let mut category_slugs = SlugAllocator::default();
    let categories = ordering
        .names()
        .into_iter()
        .filter_map(|name| {
            let entries = grouped.get(name).filter(|e| !e.is_empty())?;
            let images = entries
                .iter()
                .map(|entry| {
                    render_image(
                        entry,
                        sources.get(entry.filename.as_str()).copied(),
                        inputs,
                        image_ids.allocate(&entry.filename, "image"),
                    )
                })
                .collect();
            Some(RenderCategory {
                name: name.to_string(),
                slug: category_slugs.allocate(name, "category"),
                is_default: name == ordering.default_name(),
                images,
            })
        })
        .collect();

    let context = RenderContext {
        title: inputs.title.to_string(),
        categories,
        assets: inputs.assets.clone(),
    };
    (context, issues)
}

fn render_image(
    entry: &MetadataEntry,
    source: Option<&SourceImage>,
    inputs: &ContextInputs<'_>,
    id: String,
) -> RenderImage {
    let fallback_title = display_title(&entry.filename);
    let resolved = resolve(&[entry.title(), Some(fallback_title.as_str())]);
    let title = resolved.unwrap_or(fallback_title);
    let description = entry.description().map(str::to_string);
    let alt_text = description.clone().unwrap_or_else(|| title.clone());

    let missing = entry.missing || source.is_none();
    let pair = if missing {
        None
    } else {
        inputs.pairs.get(&entry.filename)
    };
    let dimensions = source.and_then(SourceImage::display_dimensions);

    RenderImage {
        id,
        filename: entry.filename.clone(),
        title,
        description,
        alt_text,
        category: entry.category.clone(),
        missing,
        original: inputs
            .originals
            .get(&entry.filename)
            .filter(|_| !missing)
            .map(str::to_string),
        modern: pair.map(|p| AssetRef::from(&p.modern)),
        fallback: pair.map(|p| AssetRef::from(&p.fallback)),
        placeholder: pair.and_then(|p| p.placeholder.clone()),
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    }
}

/// Persist the context as pretty JSON, skipping the write when the bytes are
/// unchanged. Returns whether the file was written.
pub fn write_render_context(
    context: &RenderContext,
    output_dir: &Path,
) -> Result<bool, RenderError> {
    let mut json = serde_json::to_string_pretty(context)?;
    json.push('\n');
    Ok(write_if_changed(
        &output_dir.join(RENDER_CONTEXT_FILENAME),
        json.as_bytes(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{Dimensions, OutputFormat};
    use crate::metadata::CategoryOrdering;
    use crate::test_helpers::{category_names, find_category, find_image, image_filenames};
    use crate::types::SourceFormat;
    use image::metadata::Orientation;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const DEFAULT: &str = "Uncategorized";

    fn source(filename: &str, w: u32, h: u32) -> SourceImage {
        SourceImage {
            filename: filename.to_string(),
            path: PathBuf::from("/content").join(filename),
            relative_path: filename.to_string(),
            size: 1,
            modified_ns: 1,
            dimensions: Some(Dimensions {
                width: w,
                height: h,
            }),
            format: SourceFormat::Jpeg,
            orientation: Orientation::NoTransforms,
        }
    }

    fn derived(path: &str, format: OutputFormat) -> DerivedFile {
        DerivedFile {
            path: path.to_string(),
            format,
            width: 80,
            height: 60,
            bytes: 10,
            sha256: "00".into(),
        }
    }

    fn pair(stem: &str) -> DerivedPair {
        DerivedPair {
            modern: derived(&format!("images/derived/{stem}.avif"), OutputFormat::Avif),
            fallback: derived(&format!("images/derived/{stem}.jpg"), OutputFormat::Jpeg),
            placeholder: Some(format!("data:image/jpeg;base64,{stem}")),
        }
    }

    fn entry(filename: &str, category: &str) -> MetadataEntry {
        MetadataEntry::stub(filename, category)
    }

    fn store(categories: &[&str], images: Vec<MetadataEntry>) -> MetadataStore {
        MetadataStore {
            categories: CategoryOrdering::new(
                categories.iter().map(|c| c.to_string()).collect(),
                DEFAULT,
            ),
            images,
        }
    }

    fn build(
        store: &MetadataStore,
        sources: &[SourceImage],
        pairs: &BTreeMap<String, DerivedPair>,
    ) -> (RenderContext, Vec<Issue>) {
        let mut originals = AssetManifest::default();
        for s in sources {
            originals.insert(s.filename.clone(), format!("images/originals/{}", s.filename));
        }
        build_context(&ContextInputs {
            title: "Gallery",
            store,
            sources,
            pairs,
            originals: &originals,
            assets: &AssetManifest::default(),
        })
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn categories_and_images_follow_declaration_order() {
        let s = store(
            &["Trips", "Portraits"],
            vec![
                entry("z.jpg", "Portraits"),
                entry("b.jpg", "Trips"),
                entry("n.png", DEFAULT),
                entry("a.jpg", "Trips"),
            ],
        );
        let sources = ["a.jpg", "b.jpg", "n.png", "z.jpg"].map(|f| source(f, 10, 10));

        let (ctx, issues) = build(&s, &sources, &BTreeMap::new());

        assert!(issues.is_empty());
        assert_eq!(category_names(&ctx), vec!["Trips", "Portraits", DEFAULT]);
        assert_eq!(
            image_filenames(find_category(&ctx, "Trips")),
            vec!["b.jpg", "a.jpg"]
        );
        assert!(find_category(&ctx, DEFAULT).is_default);
        assert!(!find_category(&ctx, "Trips").is_default);
    }

    #[test]
    fn empty_categories_are_omitted() {
        let s = store(&["Empty", "Full"], vec![entry("a.jpg", "Full")]);
        let (ctx, _) = build(&s, &[source("a.jpg", 10, 10)], &BTreeMap::new());
        assert_eq!(category_names(&ctx), vec!["Full"]);
    }

    #[test]
    fn undeclared_category_is_reported_and_skipped() {
        let s = store(&["A"], vec![entry("a.jpg", "A"), entry("b.jpg", "Nope")]);
        let sources = [source("a.jpg", 1, 1), source("b.jpg", 1, 1)];

        let (ctx, issues) = build(&s, &sources, &BTreeMap::new());

        assert_eq!(image_filenames(find_category(&ctx, "A")), vec!["a.jpg"]);
        assert_eq!(
            issues,
            vec![Issue::UnknownCategory {
                filename: "b.jpg".into(),
                category: "Nope".into()
            }]
        );
    }

    // =========================================================================
    // Per-image fields
    // =========================================================================

    #[test]
    fn image_exposes_paths_and_dimensions() {
        let s = store(&[], vec![entry("a.jpg", DEFAULT)]);
        let pairs = BTreeMap::from([("a.jpg".to_string(), pair("a-1234abcd"))]);

        let (ctx, _) = build(&s, &[source("a.jpg", 2000, 1500)], &pairs);
        let image = find_image(find_category(&ctx, DEFAULT), "a.jpg");

        assert_eq!(image.id, "a-jpg");
        assert_eq!(image.title, "A");
        assert_eq!(image.alt_text, "A");
        assert_eq!(image.original.as_deref(), Some("images/originals/a.jpg"));
        let modern = image.modern.as_ref().unwrap();
        assert_eq!(modern.path, "images/derived/a-1234abcd.avif");
        assert_eq!(modern.media_type, "image/avif");
        assert_eq!(image.fallback.as_ref().unwrap().media_type, "image/jpeg");
        assert_eq!(
            image.placeholder.as_deref(),
            Some("data:image/jpeg;base64,a-1234abcd")
        );
        assert_eq!((image.width, image.height), (Some(2000), Some(1500)));
        assert!(!image.missing);
    }

    #[test]
    fn store_title_and_description_win() {
        let mut e = entry("001-harbour_dusk.jpg", DEFAULT);
        e.title = "Harbour at Dusk".into();
        e.description = "Taken from the pier".into();
        let s = store(&[], vec![e, entry("002-night_sky.jpg", DEFAULT)]);
        let sources = [
            source("001-harbour_dusk.jpg", 1, 1),
            source("002-night_sky.jpg", 1, 1),
        ];

        let (ctx, _) = build(&s, &sources, &BTreeMap::new());
        let category = find_category(&ctx, DEFAULT);

        let titled = find_image(category, "001-harbour_dusk.jpg");
        assert_eq!(titled.title, "Harbour at Dusk");
        assert_eq!(titled.description.as_deref(), Some("Taken from the pier"));
        assert_eq!(titled.alt_text, "Taken from the pier");

        let derived_title = find_image(category, "002-night_sky.jpg");
        assert_eq!(derived_title.title, "Night Sky");
        assert_eq!(derived_title.description, None);
    }

    #[test]
    fn missing_entries_keep_their_place() {
        let mut gone = entry("gone.jpg", "A");
        gone.missing = true;
        let s = store(&["A"], vec![gone, entry("here.jpg", "A")]);
        let pairs = BTreeMap::from([("gone.jpg".to_string(), pair("gone-1234abcd"))]);

        let (ctx, _) = build(&s, &[source("here.jpg", 1, 1)], &pairs);
        let image = find_image(find_category(&ctx, "A"), "gone.jpg");

        assert!(image.missing);
        assert!(image.modern.is_none());
        assert!(image.placeholder.is_none());
        assert!(image.original.is_none());
        assert_eq!(image.width, None);
    }

    #[test]
    fn failed_image_has_no_derived_refs() {
        let s = store(&[], vec![entry("bad.jpg", DEFAULT)]);
        let (ctx, _) = build(&s, &[source("bad.jpg", 1, 1)], &BTreeMap::new());
        let image = find_image(find_category(&ctx, DEFAULT), "bad.jpg");
        assert!(!image.missing);
        assert!(image.modern.is_none() && image.fallback.is_none());
    }

    #[test]
    fn colliding_ids_are_suffixed() {
        let s = store(
            &[],
            vec![
                entry("a.jpg", DEFAULT),
                entry("A.JPG", DEFAULT),
                entry("a-jpg", DEFAULT),
            ],
        );
        let sources = ["a.jpg", "A.JPG", "a-jpg"].map(|f| source(f, 1, 1));

        let (ctx, _) = build(&s, &sources, &BTreeMap::new());
        let ids: Vec<&str> = find_category(&ctx, DEFAULT)
            .images
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a-jpg", "a-jpg-2", "a-jpg-3"]);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn context_file_is_only_rewritten_on_change() {
        let tmp = TempDir::new().unwrap();
        let s = store(&[], vec![entry("a.jpg", DEFAULT)]);
        let (ctx, _) = build(&s, &[source("a.jpg", 1, 1)], &BTreeMap::new());

        assert!(write_render_context(&ctx, tmp.path()).unwrap());
        assert!(!write_render_context(&ctx, tmp.path()).unwrap());

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(tmp.path().join(RENDER_CONTEXT_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["categories"][0]["images"][0]["filename"], "a.jpg");
        assert_eq!(json["title"], "Gallery");
    }
}
