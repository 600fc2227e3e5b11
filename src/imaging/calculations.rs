//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use image::metadata::Orientation;

/// Fit `source` inside a `max_edge` × `max_edge` box, preserving aspect ratio.
///
/// The longer edge becomes exactly `max_edge`; the shorter edge is rounded and
/// never drops below 1px. Sources already within the bound are returned as-is
/// (no upscaling).
///
/// # Examples
/// ```
/// # use contact_sheet::imaging::bounded_dimensions;
/// assert_eq!(bounded_dimensions((2000, 1500), 800), (800, 600));
/// assert_eq!(bounded_dimensions((1200, 1200), 800), (800, 800));
/// assert_eq!(bounded_dimensions((640, 480), 800), (640, 480));
/// ```
pub fn bounded_dimensions(source: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = source;
    let longer = w.max(h);
    if longer <= max_edge || longer == 0 {
        return (w, h);
    }
    let ratio = max_edge as f64 / longer as f64;
    let scale = |v: u32| ((v as f64 * ratio).round() as u32).max(1);
    if w >= h {
        (max_edge, scale(h))
    } else {
        (scale(w), max_edge)
    }
}

/// Whether applying `orientation` exchanges width and height.
pub fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

/// Dimensions as displayed once `orientation` has been applied to pixels
/// stored as `stored` (width, height).
pub fn oriented_dimensions(stored: (u32, u32), orientation: Orientation) -> (u32, u32) {
    if swaps_axes(orientation) {
        (stored.1, stored.0)
    } else {
        stored
    }
}

/// Percentage saved by `derived` relative to `original` (negative when larger).
pub fn size_reduction(original: u64, derived: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - derived as f64 / original as f64) * 100.0
}
