//! Recoverable problems collected during a build.
//!
//! Fatal conditions (unreadable content root, malformed metadata store, bad
//! config) abort the build through [`BuildError`](crate::pipeline::BuildError).
//! Everything else becomes an [`Issue`]: the build keeps going and the issue
//! is listed in the end-of-build [`BuildReport`].
//!
//! Issues split into two groups:
//!
//! | Kind | Group | Raised by |
//! |---|---|---|
//! | `ImageProcessing` | failure | derived asset pipeline (decode, encode, timeout) |
//! | `DuplicateAsset` | warning | scanner (same filename in two directories) |
//! | `UnreadableFile` | warning | scanner |
//! | `CacheCorruption` | warning | cache index load |
//! | `MissingAsset` | warning | reconciler (store entry without a source) |
//! | `UnknownCategory` | warning | render context builder |

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    /// A second source shares a filename with an earlier one and was dropped.
    DuplicateAsset {
        filename: String,
        kept: PathBuf,
        dropped: PathBuf,
    },
    /// A candidate file could not be read and was skipped by the scanner.
    UnreadableFile { path: PathBuf, reason: String },
    /// One image could not be turned into a derived pair.
    ImageProcessing { filename: String, reason: String },
    /// The cache index could not be read; the build ran with an empty cache.
    CacheCorruption { path: PathBuf, reason: String },
    /// A metadata entry names a file that no longer exists.
    MissingAsset { filename: String },
    /// A metadata entry references a category that is not declared.
    UnknownCategory { filename: String, category: String },
}

impl Issue {
    /// Failures lose output (an image without renditions); warnings don't.
    pub fn is_failure(&self) -> bool {
        matches!(self, Issue::ImageProcessing { .. })
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::DuplicateAsset {
                filename,
                kept,
                dropped,
            } => write!(
                f,
                "duplicate filename {filename}: kept {}, ignored {}",
                kept.display(),
                dropped.display()
            ),
            Issue::UnreadableFile { path, reason } => {
                write!(f, "unreadable file {}: {reason}", path.display())
            }
            Issue::ImageProcessing { filename, reason } => {
                write!(f, "{filename}: {reason}")
            }
            Issue::CacheCorruption { path, reason } => write!(
                f,
                "cache index {} unusable ({reason}); rebuilt from scratch",
                path.display()
            ),
            Issue::MissingAsset { filename } => {
                write!(f, "{filename}: listed in metadata but not found on disk")
            }
            Issue::UnknownCategory { filename, category } => {
                write!(f, "{filename}: category \"{category}\" is not declared")
            }
        }
    }
}

/// Everything that went wrong without stopping the build.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BuildReport {
    issues: Vec<Issue>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn failures(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_failure())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| !i.is_failure())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Extend<Issue> for BuildReport {
    fn extend<T: IntoIterator<Item = Issue>>(&mut self, iter: T) {
        self.issues.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_and_warnings_are_partitioned() {
        let mut report = BuildReport::new();
        report.push(Issue::MissingAsset {
            filename: "gone.jpg".into(),
        });
        report.push(Issue::ImageProcessing {
            filename: "bad.jpg".into(),
            reason: "decode failed".into(),
        });
        report.extend([Issue::UnknownCategory {
            filename: "x.png".into(),
            category: "Nope".into(),
        }]);

        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.warnings().count(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(BuildReport::new().is_clean());
    }

    #[test]
    fn display_names_the_subject() {
        let issue = Issue::DuplicateAsset {
            filename: "a.jpg".into(),
            kept: "trips/a.jpg".into(),
            dropped: "misc/a.jpg".into(),
        };
        assert_eq!(
            issue.to_string(),
            "duplicate filename a.jpg: kept trips/a.jpg, ignored misc/a.jpg"
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Issue::ImageProcessing {
            filename: "bad.jpg".into(),
            reason: "timed out".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "image_processing");
        assert_eq!(json["filename"], "bad.jpg");
    }
}
