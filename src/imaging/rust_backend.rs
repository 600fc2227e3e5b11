//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe (dimensions, format, EXIF orientation) | `ImageReader::into_decoder` (header only) |
//! | Decode (JPEG, PNG, GIF first frame, WebP) | `image` crate decoders, bounded by `image::Limits` |
//! | Orientation | `DynamicImage::apply_orientation` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder`, alpha flattened onto white |
//! | Placeholder | `DynamicImage::resize` + JPEG, wrapped by `base64` into a data URL |

use super::backend::{BackendError, Dimensions, Encoded, ImageBackend, Probe, Rendered};
use super::params::{EncodeSpec, OutputFormat, PlaceholderSpec, RenderParams};
use crate::types::SourceFormat;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, Limits, Rgb, RgbImage};
use std::path::Path;
use tracing::warn;

/// Lowest JPEG quality tried while shrinking a placeholder.
const PLACEHOLDER_QUALITY_FLOOR: u32 = 10;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, e: impl std::fmt::Display) -> BackendError {
    BackendError::Decode(format!("{}: {e}", path.display()))
}

/// Decode an image with orientation applied, refusing to allocate more than
/// `max_bytes` while decoding.
fn load_oriented(path: &Path, max_bytes: u64) -> Result<DynamicImage, BackendError> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    let mut limits = Limits::default();
    limits.max_alloc = Some(max_bytes);
    reader.limits(limits);

    let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;
    if decoder.total_bytes() > max_bytes {
        return Err(decode_error(
            path,
            format!(
                "decoded size {} bytes exceeds the {} byte limit",
                decoder.total_bytes(),
                max_bytes
            ),
        ));
    }
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Composite any alpha channel over a white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_avif(img: &DynamicImage, spec: &EncodeSpec) -> Result<Vec<u8>, BackendError> {
    // rav1e accepts 8-bit RGB(A) only.
    let img = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Vec::new();
    // One encoder thread: parallelism comes from the worker pool, and a fixed
    // thread count keeps the bitstream reproducible.
    let encoder =
        AvifEncoder::new_with_speed_quality(&mut buf, spec.speed, spec.quality.value() as u8)
            .with_num_threads(Some(1));
    img.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, spec: &EncodeSpec) -> Result<Vec<u8>, BackendError> {
    let rgb = DynamicImage::ImageRgb8(flatten_onto_white(img));
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, spec.quality.value() as u8);
    rgb.write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode(img: &DynamicImage, spec: &EncodeSpec) -> Result<Encoded, BackendError> {
    let bytes = match spec.format {
        OutputFormat::Avif => encode_avif(img, spec)?,
        OutputFormat::Jpeg => encode_jpeg(img, spec)?,
        OutputFormat::Gif => {
            return Err(BackendError::Encode(
                "GIF renditions are copied from the source, not encoded".into(),
            ));
        }
    };
    Ok(Encoded {
        format: spec.format,
        bytes,
        width: img.width(),
        height: img.height(),
    })
}

/// Shrink to the placeholder size and encode as a JPEG data URL, lowering
/// quality by 10 until it fits the budget. If even the floor quality is too
/// big, the smallest attempt is returned.
fn placeholder_data_url(
    img: &DynamicImage,
    spec: &PlaceholderSpec,
) -> Result<String, BackendError> {
    let flat = DynamicImage::ImageRgb8(flatten_onto_white(img));
    let tiny = flat.resize(spec.size, spec.size, FilterType::Lanczos3);

    let mut quality = spec.quality.value();
    loop {
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality as u8);
        tiny.write_with_encoder(encoder)
            .map_err(|e| BackendError::Encode(format!("placeholder encode failed: {e}")))?;
        let url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&buf));
        if url.len() <= spec.max_bytes || quality.saturating_sub(10) < PLACEHOLDER_QUALITY_FLOOR {
            return Ok(url);
        }
        quality -= 10;
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Probe, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let format = reader.format().and_then(SourceFormat::from_image_format);
        let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;
        let (width, height) = decoder.dimensions();
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        Ok(Probe {
            dimensions: Dimensions { width, height },
            format,
            orientation,
        })
    }

    fn render(&self, params: &RenderParams) -> Result<Rendered, BackendError> {
        let img = load_oriented(&params.source, params.max_decode_bytes)?;
        // A missing preview never fails the image.
        let placeholder = params.placeholder.and_then(|spec| {
            placeholder_data_url(&img, &spec)
                .inspect_err(|e| {
                    warn!(source = %params.source.display(), error = %e, "no placeholder")
                })
                .ok()
        });
        let resized = if img.width() == params.width && img.height() == params.height {
            img
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        let encodings = params
            .encodings
            .iter()
            .map(|spec| encode(&resized, spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rendered {
            encodings,
            placeholder,
        })
    }
}
