//! Types shared between the scanner, the imaging backend and the pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Container formats accepted as source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl SourceFormat {
    /// Recognised extensions, matched case-insensitively.
    pub const EXTENSIONS: &'static [(&'static str, SourceFormat)] = &[
        ("jpg", SourceFormat::Jpeg),
        ("jpeg", SourceFormat::Jpeg),
        ("png", SourceFormat::Png),
        ("gif", SourceFormat::Gif),
        ("webp", SourceFormat::WebP),
    ];

    /// Format implied by a path's extension, if it is a supported one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::EXTENSIONS
            .iter()
            .find(|(candidate, _)| ext.eq_ignore_ascii_case(candidate))
            .map(|(_, format)| *format)
    }

    /// Map a decoder-reported format onto the supported set.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
            image::ImageFormat::Png => Some(SourceFormat::Png),
            image::ImageFormat::Gif => Some(SourceFormat::Gif),
            image::ImageFormat::WebP => Some(SourceFormat::WebP),
            _ => None,
        }
    }

    /// Formats whose frames are not re-encoded for the modern rendition.
    ///
    /// GIF is treated as opaque: it is copied through byte for byte so any
    /// animation survives, and only its first frame feeds the fallback.
    pub fn is_passthrough(self) -> bool {
        matches!(self, SourceFormat::Gif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_is_case_insensitive() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/B.JPG")),
            Some(SourceFormat::Jpeg)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("x.WebP")),
            Some(SourceFormat::WebP)
        );
    }

    #[test]
    fn from_path_rejects_other_files() {
        assert_eq!(SourceFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(SourceFormat::from_path(Path::new("raw.tiff")), None);
        assert_eq!(SourceFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn only_gif_is_passthrough() {
        assert!(SourceFormat::Gif.is_passthrough());
        assert!(!SourceFormat::Png.is_passthrough());
    }
}
