//! Pure Rust rasterization backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Grayscale | `image::DynamicImage::grayscale` (Rec. 709 luma, alpha kept) |
//!
//! Resizes whose buffers would exceed the allocation budget are refused
//! (`None`) instead of being attempted.

use super::backend::RasterBackend;
use crate::config::DecodeConfig;
use image::DynamicImage;
use image::imageops::FilterType;

/// Default allocation budget for a single resize, matching the decode default.
pub const DEFAULT_MAX_RESIZE_BYTES: u64 = 512 * 1024 * 1024;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    filter: FilterType,
    max_bytes: u64,
}

impl RustBackend {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
            max_bytes: DEFAULT_MAX_RESIZE_BYTES,
        }
    }

    /// Use a different resampling filter (e.g. `Triangle` for speed).
    pub fn with_filter(filter: FilterType) -> Self {
        Self {
            filter,
            ..Self::new()
        }
    }

    /// Allocation budget taken from the decode limits; unlimited when absent.
    pub fn from_config(config: &DecodeConfig) -> Self {
        Self::new().with_max_bytes(config.max_alloc_bytes.unwrap_or(u64::MAX))
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Bytes a resize to `width` × `height` allocates: the output buffer and
    /// the `f32` intermediate of the separable pass, whichever is larger.
    fn resize_cost(image: &DynamicImage, width: u32, height: u32) -> u64 {
        let color = image.color();
        let output = (width as u64)
            .saturating_mul(height as u64)
            .saturating_mul(color.bytes_per_pixel() as u64);
        let intermediate = (image.width() as u64)
            .saturating_mul(height as u64)
            .saturating_mul(color.channel_count() as u64 * 4);
        output.max(intermediate)
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for RustBackend {
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> Option<DynamicImage> {
        if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
            return None;
        }
        let cost = Self::resize_cost(image, width, height);
        if cost > self.max_bytes {
            tracing::debug!(width, height, cost, budget = self.max_bytes, "Resize over budget");
            return None;
        }
        let resized = image.resize_exact(width, height, self.filter);
        (resized.width() == width && resized.height() == height).then_some(resized)
    }

    fn grayscale(&self, image: &DynamicImage) -> Option<DynamicImage> {
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        Some(image.grayscale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient_rgb, gradient_rgba};
    use image::ColorType;

    #[test]
    fn resize_produces_exact_dimensions() {
        let backend = RustBackend::new();
        let resized = backend.resize(&gradient_rgba(200, 150), 67, 50).unwrap();
        assert_eq!((resized.width(), resized.height()), (67, 50));
    }

    #[test]
    fn resize_to_zero_fails() {
        let backend = RustBackend::new();
        assert!(backend.resize(&gradient_rgba(10, 10), 0, 5).is_none());
    }

    #[test]
    fn resize_over_budget_is_refused() {
        let backend = RustBackend::new().with_max_bytes(1000);
        // 20x20 RGBA8 output is 1600 bytes
        assert!(backend.resize(&gradient_rgba(4, 4), 20, 20).is_none());
        assert!(backend.resize(&gradient_rgba(4, 4), 10, 10).is_some());
    }

    #[test]
    fn huge_target_is_refused_without_allocating() {
        let backend = RustBackend::new();
        assert!(backend.resize(&gradient_rgba(4, 4), u32::MAX, u32::MAX).is_none());
    }

    #[test]
    fn budget_follows_decode_config() {
        let config = DecodeConfig {
            max_alloc_bytes: Some(200),
            ..DecodeConfig::default()
        };
        let backend = RustBackend::from_config(&config);
        assert!(backend.resize(&gradient_rgba(4, 4), 8, 8).is_none());
        assert!(backend.resize(&gradient_rgba(4, 4), 2, 2).is_some());
    }

    #[test]
    fn resize_keeps_color_type() {
        let backend = RustBackend::with_filter(FilterType::Triangle);
        let resized = backend.resize(&gradient_rgb(20, 20), 10, 10).unwrap();
        assert_eq!(resized.color(), ColorType::Rgb8);
    }

    #[test]
    fn grayscale_keeps_alpha() {
        let backend = RustBackend::new();
        let gray = backend.grayscale(&gradient_rgba(4, 4)).unwrap();
        assert_eq!(gray.color(), ColorType::La8);

        let gray = backend.grayscale(&gradient_rgb(4, 4)).unwrap();
        assert_eq!(gray.color(), ColorType::L8);
    }
}
