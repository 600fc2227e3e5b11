//! Shared test utilities.
//!
//! Synthetic source images (written with the `image` encoders, so no binary
//! fixtures live in the repo) and lookup helpers over a built
//! [`RenderContext`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_jpeg(&tmp.path().join("content/a.jpg"), 200, 150);
//!
//! let category = find_category(&context, "Uncategorized");
//! let image = find_image(category, "a.jpg");
//! assert_eq!(image.title, "A");
//! ```

use crate::render::{RenderCategory, RenderContext, RenderImage};
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{Frame, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs;
use std::io::BufWriter;
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 95)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Write a gradient JPEG of the given size.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    fs::write(path, jpeg_bytes(width, height)).unwrap();
}

/// Write a JPEG carrying an EXIF orientation tag (1–8).
///
/// A minimal big-endian TIFF block with a single IFD0 entry (0x0112) is
/// spliced in as an APP1 segment right after the SOI marker.
pub fn write_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    let jpeg = jpeg_bytes(width, height);

    let mut payload = Vec::new();
    payload.extend_from_slice(b"Exif\0\0");
    payload.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
    payload.extend_from_slice(&1u16.to_be_bytes());
    payload.extend_from_slice(&0x0112u16.to_be_bytes());
    payload.extend_from_slice(&3u16.to_be_bytes());
    payload.extend_from_slice(&1u32.to_be_bytes());
    payload.extend_from_slice(&orientation.to_be_bytes());
    payload.extend_from_slice(&[0, 0]);
    payload.extend_from_slice(&0u32.to_be_bytes());

    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);

    ensure_parent(path);
    fs::write(path, out).unwrap();
}

/// Write an RGBA PNG: opaque red disc in the middle, transparent corners.
pub fn write_png_rgba(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 4.0;
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d < radius {
            Rgba([200, 30, 30, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Write a two-frame animated GIF.
pub fn write_gif(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let file = fs::File::create(path).unwrap();
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    let frames = [Rgba([220, 40, 40, 255]), Rgba([40, 40, 220, 255])]
        .into_iter()
        .map(|px| Frame::new(RgbaImage::from_pixel(width, height, px)));
    encoder.encode_frames(frames).unwrap();
}

// =========================================================================
// RenderContext lookups (panic with a clear message on miss)
// =========================================================================

/// Find a category by name. Panics if not found.
pub fn find_category<'a>(context: &'a RenderContext, name: &str) -> &'a RenderCategory {
    context
        .categories
        .iter()
        .find(|c| c.name == name)
        .unwrap_or_else(|| {
            let names: Vec<&str> = context.categories.iter().map(|c| c.name.as_str()).collect();
            panic!("category '{name}' not found. Available: {names:?}")
        })
}

/// Find an image by filename within a category. Panics if not found.
pub fn find_image<'a>(category: &'a RenderCategory, filename: &str) -> &'a RenderImage {
    category
        .images
        .iter()
        .find(|i| i.filename == filename)
        .unwrap_or_else(|| {
            let names: Vec<&str> = category.images.iter().map(|i| i.filename.as_str()).collect();
            panic!(
                "image '{filename}' not found in '{}'. Available: {names:?}",
                category.name
            )
        })
}

/// Category names in render order.
pub fn category_names(context: &RenderContext) -> Vec<&str> {
    context.categories.iter().map(|c| c.name.as_str()).collect()
}

/// Image filenames of a category in render order.
pub fn image_filenames(category: &RenderCategory) -> Vec<&str> {
    category.images.iter().map(|i| i.filename.as_str()).collect()
}
