//! CLI output formatting for the build.
//!
//! # Information-First Display
//!
//! Output is about images and categories, not files. Each entity leads with
//! its positional index and title; filenames and derived paths follow as
//! indented context, so a build log reads as a content inventory.
//!
//! # Output Format
//!
//! ## Build progress
//!
//! ```text
//! Scanned content: 3 images
//! Metadata
//!     + c.jpg
//!     - gone.jpg (missing)
//! Processing 3 images on 8 threads
//!     001 a.jpg: cached
//!     002 b.png: encoded
//!         images/derived/b-1a2b3c4d.avif
//!         images/derived/b-1a2b3c4d.jpg
//!     003 c.jpg: failed (decode error: ...)
//! Published 2 assets, 3 originals (1 written)
//! ```
//!
//! ## Summary
//!
//! ```text
//! 001 Trips (2 images)
//!     001 Harbour at dusk
//!     002 B
//! 002 Uncategorized (1 image)
//!     001 C (no renditions)
//!
//! Cache: 1 cached, 1 encoded, 1 failed (3 total)
//! Context: dist/render-context.json (written)
//! Failures (1)
//!     c.jpg: decode error: ...
//! ```
//!
//! # Architecture
//!
//! Every `format_*` function returns `Vec<String>` and does no I/O; the
//! `print_*` wrappers write those lines to stdout.

use crate::pipeline::{BuildEvent, BuildOutcome, CheckOutcome};
use crate::process::{ImageStatus, ProcessEvent};
use crate::reconcile::Reconciliation;
use crate::render::{RenderContext, RenderImage};
use crate::report::BuildReport;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Format a category header: positional index + name + image count.
///
/// ```text
/// 001 Trips (5 images)
/// ```
fn entity_header(index: usize, name: &str, count: usize) -> String {
    format!("{} {} ({})", format_index(index), name, plural(count, "image"))
}

/// Format an image line: title first, with state the viewer would notice.
fn image_line(index: usize, image: &RenderImage) -> String {
    let state = if image.missing {
        " (missing)"
    } else if image.modern.is_none() {
        " (no renditions)"
    } else {
        ""
    };
    format!("{} {}{}", format_index(index), image.title, state)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Format a reconciliation diff.
pub fn format_reconciliation(diff: &Reconciliation) -> Vec<String> {
    let mut lines = vec!["Metadata".to_string()];
    if diff.added.is_empty() && diff.missing.is_empty() {
        lines.push(format!(
            "{}unchanged ({})",
            indent(1),
            plural(diff.existing.len(), "entry")
        ));
        return lines;
    }
    lines.extend(diff.added.iter().map(|f| format!("{}+ {f}", indent(1))));
    lines.extend(
        diff.missing
            .iter()
            .map(|f| format!("{}- {f} (missing)", indent(1))),
    );
    lines
}

/// Format a single progress event from the derived asset pipeline.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started {
            image_count,
            threads,
        } => vec![format!(
            "Processing {} on {}",
            plural(*image_count, "image"),
            plural(*threads, "thread")
        )],
        ProcessEvent::ImageProcessed {
            index,
            filename,
            status,
            outputs,
        } => {
            let head = format!("{}{} {}", indent(1), format_index(*index), filename);
            match status {
                ImageStatus::Cached => vec![format!("{head}: cached")],
                ImageStatus::Encoded => {
                    let mut lines = vec![format!("{head}: encoded")];
                    lines.extend(outputs.iter().map(|p| format!("{}{p}", indent(2))));
                    lines
                }
                ImageStatus::Failed(reason) => {
                    vec![format!("{head}: failed ({})", truncate_desc(reason, 60))]
                }
            }
        }
    }
}

/// Format any build progress event.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Scanned {
            root,
            images,
            skipped,
        } => {
            let mut line = format!("Scanned {}: {}", root.display(), plural(*images, "image"));
            if *skipped > 0 {
                line.push_str(&format!(", {skipped} skipped"));
            }
            vec![line]
        }
        BuildEvent::Reconciled(diff) => format_reconciliation(diff),
        BuildEvent::Processing(event) => format_process_event(event),
        BuildEvent::Published {
            statics,
            originals,
            written,
        } => vec![format!(
            "Published {}, {} ({written} written)",
            plural(*statics, "asset"),
            plural(*originals, "original")
        )],
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Format the render context as a category/image inventory.
pub fn format_context(context: &RenderContext) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, category) in context.categories.iter().enumerate() {
        lines.push(entity_header(i + 1, &category.name, category.images.len()));
        for (j, image) in category.images.iter().enumerate() {
            lines.push(format!("{}{}", indent(1), image_line(j + 1, image)));
        }
    }
    lines
}

/// Format the end-of-build report: failures first, then warnings.
pub fn format_report(report: &BuildReport) -> Vec<String> {
    if report.is_clean() {
        return vec!["No issues".to_string()];
    }
    let mut lines = Vec::new();
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        lines.push(format!("Failures ({})", failures.len()));
        lines.extend(failures.iter().map(|i| format!("{}{i}", indent(1))));
    }
    let warnings: Vec<_> = report.warnings().collect();
    if !warnings.is_empty() {
        lines.push(format!("Warnings ({})", warnings.len()));
        lines.extend(warnings.iter().map(|i| format!("{}{i}", indent(1))));
    }
    lines
}

/// Format everything printed after a successful build.
pub fn format_build_summary(outcome: &BuildOutcome) -> Vec<String> {
    let mut lines = format_context(&outcome.context);
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("Cache: {}", outcome.stats));
    lines.push(format!(
        "Context: {} ({})",
        outcome.context_path().display(),
        if outcome.context_written {
            "written"
        } else {
            "unchanged"
        }
    ));
    lines.extend(format_report(&outcome.report));
    lines
}

/// Format the result of `check`.
pub fn format_check_output(outcome: &CheckOutcome) -> Vec<String> {
    let mut lines = vec![format!("Found {}", plural(outcome.images.len(), "image"))];
    lines.extend(format_reconciliation(&outcome.reconciliation));
    lines.extend(format_report(&outcome.report));
    lines
}

pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

pub fn print_build_summary(outcome: &BuildOutcome) {
    for line in format_build_summary(outcome) {
        println!("{}", line);
    }
}

pub fn print_check_output(outcome: &CheckOutcome) {
    for line in format_check_output(outcome) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetManifest;
    use crate::cache::CacheStats;
    use crate::render::{AssetRef, RenderCategory};
    use crate::report::Issue;
    use std::path::PathBuf;

    fn image(title: &str, rendered: bool, missing: bool) -> RenderImage {
        let asset = AssetRef {
            path: "images/derived/x-00000000.avif".into(),
            media_type: "image/avif".into(),
            width: 10,
            height: 10,
        };
        RenderImage {
            id: title.to_lowercase(),
            filename: format!("{}.jpg", title.to_lowercase()),
            title: title.into(),
            description: None,
            alt_text: title.into(),
            category: "Trips".into(),
            missing,
            original: None,
            modern: rendered.then(|| asset.clone()),
            fallback: rendered.then_some(asset),
            placeholder: None,
            width: Some(10),
            height: Some(10),
        }
    }

    fn context() -> RenderContext {
        RenderContext {
            title: "Gallery".into(),
            categories: vec![
                RenderCategory {
                    name: "Trips".into(),
                    slug: "trips".into(),
                    is_default: false,
                    images: vec![image("Harbour", true, false), image("Gone", false, true)],
                },
                RenderCategory {
                    name: "Uncategorized".into(),
                    slug: "uncategorized".into(),
                    is_default: true,
                    images: vec![image("Broken", false, false)],
                },
            ],
            assets: AssetManifest::default(),
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn plural_handles_one() {
        assert_eq!(plural(1, "image"), "1 image");
        assert_eq!(plural(0, "image"), "0 images");
    }

    #[test]
    fn entity_header_counts_images() {
        assert_eq!(entity_header(2, "Trips", 5), "002 Trips (5 images)");
    }

    #[test]
    fn truncate_desc_respects_char_boundaries() {
        assert_eq!(truncate_desc("short", 40), "short");
        assert_eq!(truncate_desc("ééééé", 3), "ééé...");
    }

    // =========================================================================
    // Progress
    // =========================================================================

    #[test]
    fn reconciliation_lists_added_and_missing() {
        let diff = Reconciliation {
            added: vec!["new.jpg".into()],
            missing: vec!["gone.jpg".into()],
            existing: vec!["a.jpg".into()],
        };
        assert_eq!(
            format_reconciliation(&diff),
            vec!["Metadata", "    + new.jpg", "    - gone.jpg (missing)"]
        );
    }

    #[test]
    fn unchanged_reconciliation_is_one_line() {
        let diff = Reconciliation {
            existing: vec!["a.jpg".into()],
            ..Default::default()
        };
        assert_eq!(
            format_reconciliation(&diff),
            vec!["Metadata", "    unchanged (1 entry)"]
        );
    }

    #[test]
    fn encoded_image_lists_outputs() {
        let event = ProcessEvent::ImageProcessed {
            index: 2,
            filename: "b.png".into(),
            status: ImageStatus::Encoded,
            outputs: vec!["images/derived/b-1.avif".into(), "images/derived/b-1.jpg".into()],
        };
        assert_eq!(
            format_process_event(&event),
            vec![
                "    002 b.png: encoded",
                "        images/derived/b-1.avif",
                "        images/derived/b-1.jpg",
            ]
        );
    }

    #[test]
    fn cached_and_failed_images_are_one_line() {
        let cached = ProcessEvent::ImageProcessed {
            index: 1,
            filename: "a.jpg".into(),
            status: ImageStatus::Cached,
            outputs: vec!["ignored".into()],
        };
        let failed = ProcessEvent::ImageProcessed {
            index: 3,
            filename: "c.jpg".into(),
            status: ImageStatus::Failed("bad header".into()),
            outputs: vec![],
        };
        assert_eq!(format_process_event(&cached), vec!["    001 a.jpg: cached"]);
        assert_eq!(
            format_process_event(&failed),
            vec!["    003 c.jpg: failed (bad header)"]
        );
    }

    #[test]
    fn started_event_names_threads() {
        let event = BuildEvent::Processing(ProcessEvent::Started {
            image_count: 3,
            threads: 1,
        });
        assert_eq!(
            format_build_event(&event),
            vec!["Processing 3 images on 1 thread"]
        );
    }

    #[test]
    fn scanned_event_mentions_skips() {
        let event = BuildEvent::Scanned {
            root: PathBuf::from("content"),
            images: 4,
            skipped: 1,
        };
        assert_eq!(
            format_build_event(&event),
            vec!["Scanned content: 4 images, 1 skipped"]
        );
    }

    // =========================================================================
    // Summary
    // =========================================================================

    #[test]
    fn context_inventory_marks_missing_and_unrendered() {
        assert_eq!(
            format_context(&context()),
            vec![
                "001 Trips (2 images)",
                "    001 Harbour",
                "    002 Gone (missing)",
                "002 Uncategorized (1 image)",
                "    001 Broken (no renditions)",
            ]
        );
    }

    #[test]
    fn clean_report_says_so() {
        assert_eq!(format_report(&BuildReport::new()), vec!["No issues"]);
    }

    #[test]
    fn report_lists_failures_before_warnings() {
        let mut report = BuildReport::new();
        report.push(Issue::MissingAsset {
            filename: "gone.jpg".into(),
        });
        report.push(Issue::ImageProcessing {
            filename: "c.jpg".into(),
            reason: "bad header".into(),
        });
        let lines = format_report(&report);
        assert_eq!(lines[0], "Failures (1)");
        assert_eq!(lines[1], "    c.jpg: bad header");
        assert_eq!(lines[2], "Warnings (1)");
        assert!(lines[3].contains("gone.jpg"));
    }

    #[test]
    fn build_summary_ends_with_cache_context_and_report() {
        let mut stats = CacheStats::default();
        stats.hit();
        stats.miss();
        let outcome = BuildOutcome {
            context: context(),
            report: BuildReport::new(),
            reconciliation: Reconciliation::default(),
            stats,
            output_dir: PathBuf::from("dist"),
            cache_written: true,
            assets_written: 0,
            context_written: false,
        };
        let lines = format_build_summary(&outcome);
        let tail = &lines[lines.len() - 3..];
        assert_eq!(tail[0], "Cache: 1 cached, 1 encoded (2 total)");
        assert!(tail[1].ends_with("render-context.json (unchanged)"));
        assert_eq!(tail[2], "No issues");
    }
}
