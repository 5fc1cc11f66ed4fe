//! Geometry and geometric transforms.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Fit** | pure calculation, ceiling rule |
//! | **Scale** | `RasterBackend::resize` (Lanczos3 via `image`) |
//! | **Orient** | `image::DynamicImage::apply_orientation` |
//! | **Grayscale** | `RasterBackend::grayscale` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for fit geometry (unit testable)
//! - **Parameters**: Data structures describing operations
//! - **Backend**: [`RasterBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::RasterBackend;
pub use calculations::{Dimensions, Size, compute_target_dimensions, matches_target, pixel_ceil};
pub use operations::{decode_immediately, normalize_orientation, rasterize, scale, to_grayscale};
pub use params::{
    ContentMode, EffectSpec, EncodingOptions, EncodingSpec, FitSpec, Quality, Tint,
};
pub use rust_backend::RustBackend;
