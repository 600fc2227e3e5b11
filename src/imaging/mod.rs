//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_decoder` (header + EXIF orientation) |
//! | **Resize** | Lanczos3 via `DynamicImage::resize_exact` |
//! | **Modern rendition** | AVIF, rav1e encoder |
//! | **Fallback rendition** | baseline JPEG, alpha flattened onto white |
//! | **Placeholder** | ~20px JPEG as a base64 `data:` URL |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, Encoded, ImageBackend, Probe, Rendered};
pub use calculations::{bounded_dimensions, oriented_dimensions, size_reduction, swaps_axes};
pub use operations::{
    DerivedFile, DerivedPair, RenditionConfig, SourceSpec, create_derived_pair, derived_name,
    plan_render,
};
pub use params::{EncodeSpec, OutputFormat, PlaceholderSpec, Quality, RenderParams};
pub use rust_backend::RustBackend;
